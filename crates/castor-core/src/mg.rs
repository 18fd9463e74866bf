use castor_bootstrap::{BitBoard, Color, Direction, Square};

use crate::{
    board::Board,
    index,
    repr::{CastleSide, Move, MoveList, PieceKind},
};

/// Generates all and only the legal moves of the position.
pub fn gen_moves(board: &Board) -> MoveList {
    let mut moves = MoveList::new();
    gen_moves_into(board, &mut moves);

    moves
}

/// Generates the legal moves into `out`, partitioned so that captures come
/// first, then check interpositions, then the remaining quiet moves. The
/// generation is pin- and check-aware; no post-hoc legality filter runs, and
/// after any produced move the mover's king is not attacked.
pub fn gen_moves_into(board: &Board, out: &mut MoveList) {
    let color = board.active;
    let us = board.side(color);
    let them = board.side(!color);

    let friendly = us.occupation;
    let hostile = them.occupation;
    let total = friendly | hostile;
    let king_square: Square = us.king.try_into().unwrap();

    let mut captures = MoveList::new();
    let mut blocks = MoveList::new();
    let mut quiets = MoveList::new();

    let is_white = color == Color::White;
    let back_rank = BitBoard::rank(if is_white { 7 } else { 0 });
    let promotion_rank = BitBoard::rank(if is_white { 6 } else { 1 });
    let double_push_rank = BitBoard::rank(if is_white { 1 } else { 6 });
    let en_passant_rank = BitBoard::rank(if is_white { 4 } else { 3 });

    // The enemy pawn that just advanced two squares, and our pawns beside
    // it that could take it en passant.
    let two_moved_pawn = board
        .double_push_file
        .map_or(BitBoard::EMPTY, BitBoard::file)
        & en_passant_rank;
    let en_passant_origins =
        (two_moved_pawn.shift(Direction::East) | two_moved_pawn.shift(Direction::West)) & us.pawns;

    let straight_attackers = them.rooks | them.queens;
    let diagonal_attackers = them.bishops | them.queens;

    // For each direction from the king: the open squares up to the first
    // enemy slider attacking along it, when exactly one friendly piece
    // stands in between. That piece may only move along the ray or capture
    // the pinner.
    let mut pin_rays = [BitBoard::EMPTY; 8];
    let mut pin_causers = [BitBoard::EMPTY; 8];
    let mut en_passant_pinned = false;

    for direction in Direction::ALL {
        let danger = if direction.is_straight() {
            straight_attackers
        } else {
            diagonal_attackers
        };

        let ray = index::ray_slides(king_square, direction, danger);
        let causer = ray & danger;

        if causer.is_empty() {
            continue;
        }

        let open = ray - causer;
        let friendly_between = (friendly & open).count_ones();
        let hostile_between = (hostile & open).count_ones();

        if friendly_between == 1 && hostile_between == 0 {
            pin_rays[direction.as_index()] = open;
            pin_causers[direction.as_index()] = causer;
        } else if direction.is_diagonal()
            && friendly_between == 0
            && hostile_between == 1
            && !(open & two_moved_pawn).is_empty()
        {
            // The double-pushed pawn is the only shield on this diagonal;
            // taking it en passant would expose the king.
            en_passant_pinned = true;
        } else if matches!(direction, Direction::East | Direction::West)
            && friendly_between == 1
            && hostile_between == 1
            && !(two_moved_pawn & open).is_empty()
            && !(en_passant_origins & open).is_empty()
        {
            // Both pawns of the en-passant pair sit between the king and a
            // rook or queen; the capture would clear the whole rank at once.
            en_passant_pinned = true;
        }
    }

    let pin_prevents = |origin: Square, target: Square| -> bool {
        let origin_bb = BitBoard::from(origin);

        for index in 0..8 {
            if !(origin_bb & pin_rays[index]).is_empty() {
                return (BitBoard::from(target) & (pin_rays[index] | pin_causers[index]))
                    .is_empty();
            }
        }

        false
    };

    let active_knight_attackers = them.knights & index::knight_attacks(king_square);
    let active_diagonal_attackers = diagonal_attackers & index::bishop_slides(king_square, total);
    let active_straight_attackers = straight_attackers & index::rook_slides(king_square, total);
    let active_pawn_attackers =
        them.pawns & (us.king.move_one_up_left(color) | us.king.move_one_up_right(color));

    let attackers = active_knight_attackers
        | active_diagonal_attackers
        | active_straight_attackers
        | active_pawn_attackers;

    if !attackers.is_empty() {
        if attackers.is_a_single_one() {
            let attacker_square: Square = attackers.try_into().unwrap();

            // Capture the checker. King captures are folded into the
            // evasions below.
            let capturers = ((us.rooks | us.queens) & index::rook_slides(attacker_square, total))
                | ((us.bishops | us.queens) & index::bishop_slides(attacker_square, total))
                | (us.knights & index::knight_attacks(attacker_square));

            for origin in capturers.bits() {
                if !pin_prevents(origin, attacker_square) {
                    captures.push(Move::new(origin, attacker_square));
                }
            }

            let pawn_capturers = us.pawns
                & (attackers.move_one_down_left(color) | attackers.move_one_down_right(color));

            for origin in pawn_capturers.bits() {
                if pin_prevents(origin, attacker_square) {
                    continue;
                }

                if !(BitBoard::from(origin) & promotion_rank).is_empty() {
                    for kind in PieceKind::PROMOTIONS {
                        captures.push(Move::promotion(origin, attacker_square, kind));
                    }
                } else {
                    captures.push(Move::new(origin, attacker_square));
                }
            }

            // A double-pushed checker can be taken en passant as well.
            if !(attackers & two_moved_pawn).is_empty() && !en_passant_pinned {
                let target: Square = attackers.move_one_up(color).try_into().unwrap();

                for origin in en_passant_origins.bits() {
                    if !pin_prevents(origin, target) {
                        captures.push(Move::en_passant(origin, target));
                    }
                }
            }

            // Interpose on the checking line. Only sliders leave room for
            // that; a knight or contact checker has no line to cut.
            let block_area = if !(active_diagonal_attackers | active_straight_attackers).is_empty()
            {
                index::line_between(attacker_square, king_square)
            } else {
                BitBoard::EMPTY
            };

            if !block_area.is_empty() {
                for origin in us.pawns.bits() {
                    let origin_bb = BitBoard::from(origin);
                    let one_ahead_bb = origin_bb.move_one_up(color);
                    let one_ahead: Square = one_ahead_bb.try_into().unwrap();
                    let pinned_ahead = pin_prevents(origin, one_ahead);

                    if !(one_ahead_bb & block_area).is_empty() && !pinned_ahead {
                        if !(one_ahead_bb & back_rank).is_empty() {
                            for kind in PieceKind::PROMOTIONS {
                                blocks.push(Move::promotion(origin, one_ahead, kind));
                            }
                        } else {
                            blocks.push(Move::new(origin, one_ahead));
                        }
                    }

                    if !(origin_bb & double_push_rank).is_empty() && !pinned_ahead {
                        let two_ahead_bb = one_ahead_bb.move_one_up(color);

                        if (one_ahead_bb & total).is_empty()
                            && !(two_ahead_bb & block_area).is_empty()
                        {
                            blocks.push(Move::new(origin, two_ahead_bb.try_into().unwrap()));
                        }
                    }
                }

                if !two_moved_pawn.is_empty() && !en_passant_pinned {
                    let target_bb = two_moved_pawn.move_one_up(color);

                    if !(target_bb & block_area).is_empty() {
                        let target: Square = target_bb.try_into().unwrap();

                        for origin in en_passant_origins.bits() {
                            if !pin_prevents(origin, target) {
                                blocks.push(Move::en_passant(origin, target));
                            }
                        }
                    }
                }

                for origin in (us.knights | us.bishops | us.rooks | us.queens).bits() {
                    let reachable = piece_targets(us, origin, total);

                    for target in (reachable & block_area).bits() {
                        if !pin_prevents(origin, target) {
                            blocks.push(Move::new(origin, target));
                        }
                    }
                }
            }
        }

        // Evasions work against any number of checkers. Sliders keep
        // defending the squares behind the king, so it is lifted off the
        // board before the defend map is taken.
        let mut without_king = *board;
        without_king
            .side_mut(color)
            .toggle_piece(PieceKind::King, king_square);

        let defended = without_king.defend_map(!color);
        let escapes = index::king_attacks(king_square) - friendly - defended;

        for target in escapes.bits() {
            quiets.push(Move::new(king_square, target));
        }

        out.extend(captures);
        out.extend(blocks);
        out.extend(quiets);

        return;
    }

    // Not in check. Every piece moves freely under its pin mask.
    for origin in us.pawns.bits() {
        let origin_bb = BitBoard::from(origin);
        let one_ahead_bb = origin_bb.move_one_up(color);
        let one_ahead: Square = one_ahead_bb.try_into().unwrap();

        if (one_ahead_bb & total).is_empty() && !pin_prevents(origin, one_ahead) {
            if !(one_ahead_bb & back_rank).is_empty() {
                for kind in PieceKind::PROMOTIONS {
                    quiets.push(Move::promotion(origin, one_ahead, kind));
                }
            } else {
                quiets.push(Move::new(origin, one_ahead));
            }

            if !(origin_bb & double_push_rank).is_empty() {
                let two_ahead_bb = one_ahead_bb.move_one_up(color);

                if (two_ahead_bb & total).is_empty() {
                    quiets.push(Move::new(origin, two_ahead_bb.try_into().unwrap()));
                }
            }
        }

        for capture_bb in [
            origin_bb.move_one_up_left(color),
            origin_bb.move_one_up_right(color),
        ] {
            if (capture_bb & hostile).is_empty() {
                continue;
            }

            let target: Square = capture_bb.try_into().unwrap();

            if pin_prevents(origin, target) {
                continue;
            }

            if !(capture_bb & back_rank).is_empty() {
                for kind in PieceKind::PROMOTIONS {
                    captures.push(Move::promotion(origin, target, kind));
                }
            } else {
                captures.push(Move::new(origin, target));
            }
        }
    }

    if !two_moved_pawn.is_empty() && !en_passant_pinned {
        let target: Square = two_moved_pawn.move_one_up(color).try_into().unwrap();

        for origin in en_passant_origins.bits() {
            if !pin_prevents(origin, target) {
                captures.push(Move::en_passant(origin, target));
            }
        }
    }

    let defended = board.defend_map(!color);
    let escapes = index::king_attacks(king_square) - friendly - defended;

    for target in escapes.bits() {
        if hostile.get_bit(target) {
            captures.push(Move::new(king_square, target));
        } else {
            quiets.push(Move::new(king_square, target));
        }
    }

    let king_side_mask = BitBoard::king_side_castle_mask(color);
    let (king_rook, queen_rook) = match color {
        Color::White => (Square::WHITE_KING_ROOK, Square::WHITE_QUEEN_ROOK),
        Color::Black => (Square::BLACK_KING_ROOK, Square::BLACK_QUEEN_ROOK),
    };

    if board.castling.can_castle(color, CastleSide::King)
        && (total & king_side_mask).is_empty()
        && (defended & king_side_mask).is_empty()
        && us.rooks.get_bit(king_rook)
    {
        quiets.push(Move::castle(CastleSide::King, color));
    }

    if board.castling.can_castle(color, CastleSide::Queen)
        && (total & BitBoard::queen_side_castle_occupation_mask(color)).is_empty()
        && (defended & BitBoard::queen_side_castle_attack_mask(color)).is_empty()
        && us.rooks.get_bit(queen_rook)
    {
        quiets.push(Move::castle(CastleSide::Queen, color));
    }

    for origin in (us.knights | us.bishops | us.rooks | us.queens).bits() {
        let reachable = piece_targets(us, origin, total) - friendly;

        for target in reachable.bits() {
            if pin_prevents(origin, target) {
                continue;
            }

            if hostile.get_bit(target) {
                captures.push(Move::new(origin, target));
            } else {
                quiets.push(Move::new(origin, target));
            }
        }
    }

    out.extend(captures);
    out.extend(blocks);
    out.extend(quiets);
}

/// The attack set of the non-pawn, non-king piece on `origin`.
fn piece_targets(us: &crate::repr::Side, origin: Square, total: BitBoard) -> BitBoard {
    let origin_bb = BitBoard::from(origin);

    if !(origin_bb & us.knights).is_empty() {
        return index::knight_attacks(origin);
    }

    let mut slides = BitBoard::EMPTY;

    if !(origin_bb & (us.rooks | us.queens)).is_empty() {
        slides |= index::rook_slides(origin, total);
    }

    if !(origin_bb & (us.bishops | us.queens)).is_empty() {
        slides |= index::bishop_slides(origin, total);
    }

    slides
}
