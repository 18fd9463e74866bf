use castor_bootstrap::{BitBoard, Color, Direction};
use castor_core::board::Board;

use crate::score::{self, Eval};

pub const QUEEN_VALUE: i32 = 900;
pub const ROOK_VALUE: i32 = 500;
pub const BISHOP_VALUE: i32 = 350;
pub const KNIGHT_VALUE: i32 = 300;
pub const PAWN_VALUE: i32 = 100;

const BISHOP_PAIR_BONUS: i32 = 40;
const SQUARE_ATTACK_BONUS: i32 = 4;

// Bonuses for having an enemy piece of the given kind under attack.
const QUEEN_ATTACK_BONUS: i32 = 40;
const ROOK_ATTACK_BONUS: i32 = 30;
const KNIGHT_ATTACK_BONUS: i32 = 25;
const BISHOP_ATTACK_BONUS: i32 = 20;
const PAWN_ATTACK_BONUS: i32 = 5;

const CENTRAL_PAWN_BONUS: i32 = 15;
const EDGE_PAWN_PENALTY: i32 = 10;
const SIXTH_RANK_PAWN_BONUS: i32 = 100;
const SEVENTH_RANK_PAWN_BONUS: i32 = 150;
const PAWN_CHAIN_BONUS: i32 = 10;
// Per 100 centipawns the attacked piece is worth above a pawn.
const PAWN_LEVERAGE_BONUS: i32 = 10;

const DOUBLED_PAWN_PENALTY: i32 = 20;
const OPEN_FILE_ROOK_BONUS: i32 = 10;

const KNIGHT_PAWN_COUPLING: i32 = 6;
const BISHOP_PAWN_PENALTY: i32 = 3;

const KING_EDGE_BONUS: i32 = 40;
const KING_SECOND_BAND_BONUS: i32 = 15;
const KING_OPEN_AREA_PENALTY: i32 = 15;
const ENEMY_KING_CONTACT_BONUS: i32 = 40;

/// The heuristic score of the position in centipawns, from white's
/// perspective, clamped into the non-mate range.
pub fn static_eval(board: &Board) -> Eval {
    score::truncated(side_eval(board, Color::White) - side_eval(board, Color::Black))
}

fn count(bitboard: BitBoard) -> i32 {
    bitboard.count_ones() as i32
}

fn side_eval(board: &Board, color: Color) -> Eval {
    let us = board.side(color);
    let them = board.side(!color);
    let attacks = board.attack_map(color);

    let num_knights = count(us.knights);
    let num_bishops = count(us.bishops);
    let all_pawns = count(us.pawns | them.pawns);

    let mut score = QUEEN_VALUE * count(us.queens)
        + ROOK_VALUE * count(us.rooks)
        + BISHOP_VALUE * num_bishops
        + KNIGHT_VALUE * num_knights
        + PAWN_VALUE * count(us.pawns);

    // The pair only counts with a bishop on each square color.
    if !(us.bishops & BitBoard::LIGHT_SQUARES).is_empty()
        && !(us.bishops & BitBoard::DARK_SQUARES).is_empty()
    {
        score += BISHOP_PAIR_BONUS;
    }

    score += SQUARE_ATTACK_BONUS * count(attacks);

    score += QUEEN_ATTACK_BONUS * count(attacks & them.queens);
    score += ROOK_ATTACK_BONUS * count(attacks & them.rooks);
    score += KNIGHT_ATTACK_BONUS * count(attacks & them.knights);
    score += BISHOP_ATTACK_BONUS * count(attacks & them.bishops);
    score += PAWN_ATTACK_BONUS * count(attacks & them.pawns);

    score += CENTRAL_PAWN_BONUS * count(us.pawns - BitBoard::EDGE_FILES);
    score -= EDGE_PAWN_PENALTY * count(us.pawns & BitBoard::EDGE_FILES);

    let relative_rank = |index: u8| match color {
        Color::White => BitBoard::rank(index),
        Color::Black => BitBoard::rank(7 - index),
    };

    score += SIXTH_RANK_PAWN_BONUS * count(us.pawns & relative_rank(5));
    score += SEVENTH_RANK_PAWN_BONUS * count(us.pawns & relative_rank(6));

    score -= 40 * count(us.knights & BitBoard::RINGS[0]);
    score -= 20 * count(us.knights & BitBoard::RINGS[1]);
    score += 20 * count(us.knights & BitBoard::RINGS[3]);

    // Knights gain value in pawn-heavy positions, bishops lose a little.
    score += num_knights * KNIGHT_PAWN_COUPLING * all_pawns;
    score -= num_bishops * BISHOP_PAWN_PENALTY * all_pawns;

    for file_index in 0..8 {
        let file = BitBoard::file(file_index);

        if !(file & us.rooks).is_empty() && (file & us.pawns).is_empty() {
            score += OPEN_FILE_ROOK_BONUS;
        }

        let file_pawns = count(file & us.pawns);

        if file_pawns > 1 {
            score -= DOUBLED_PAWN_PENALTY * (file_pawns - 1);
        }
    }

    let pawn_attacks_left = us.pawns.move_one_up_left(color);
    let pawn_attacks_right = us.pawns.move_one_up_right(color);

    score += PAWN_CHAIN_BONUS * count(pawn_attacks_left & us.pawns);
    score += PAWN_CHAIN_BONUS * count(pawn_attacks_right & us.pawns);

    for (victims, value) in [
        (them.queens, QUEEN_VALUE),
        (them.rooks, ROOK_VALUE),
        (them.bishops, BISHOP_VALUE),
        (them.knights, KNIGHT_VALUE),
    ] {
        let leverage = PAWN_LEVERAGE_BONUS * ((value - PAWN_VALUE) / PAWN_VALUE);

        score += leverage * count(pawn_attacks_left & victims);
        score += leverage * count(pawn_attacks_right & victims);
    }

    // King safety scores the bands absolutely; a king that has castled away
    // sits on the back rank or an edge file either way.
    score += KING_EDGE_BONUS * count(us.king & BitBoard::EDGE_RANKS);
    score += KING_EDGE_BONUS * count(us.king & BitBoard::EDGE_FILES);
    score += KING_SECOND_BAND_BONUS
        * count(us.king & (BitBoard::rank(1) | BitBoard::rank(6)));
    score += KING_SECOND_BAND_BONUS
        * count(us.king & (BitBoard::file(1) | BitBoard::file(6)));

    let king_line =
        us.king.shift(Direction::West) | us.king | us.king.shift(Direction::East);
    let king_area = (king_line.shift(Direction::North)
        | king_line
        | king_line.shift(Direction::South))
        - us.king;

    score -= KING_OPEN_AREA_PENALTY * count(king_area - us.occupation);

    if !(attacks & them.king).is_empty() {
        score += ENEMY_KING_CONTACT_BONUS;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use test_case::test_case;

    fn swap_case(character: char) -> char {
        if character.is_ascii_uppercase() {
            character.to_ascii_lowercase()
        } else {
            character.to_ascii_uppercase()
        }
    }

    /// The color-mirrored FEN: ranks flipped, piece colors swapped, side to
    /// move flipped.
    fn mirrored_fen(fen: &str) -> String {
        let parts: Vec<&str> = fen.split(' ').collect();

        let placement = parts[0]
            .split('/')
            .rev()
            .map(|row| row.chars().map(swap_case).collect::<String>())
            .collect::<Vec<_>>()
            .join("/");

        let active = if parts[1] == "w" { "b" } else { "w" };

        let castling = if parts[2] == "-" {
            String::from("-")
        } else {
            parts[2].chars().map(swap_case).collect()
        };

        let en_passant = if parts[3] == "-" {
            String::from("-")
        } else {
            let mut characters = parts[3].chars();
            let file = characters.next().unwrap();
            let rank = characters.next().unwrap();

            format!("{file}{}", (b'9' - (rank as u8 - b'0')) as char)
        };

        let mut mirrored = format!("{placement} {active} {castling} {en_passant}");

        for part in &parts[4..] {
            mirrored.push(' ');
            mirrored.push_str(part);
        }

        mirrored
    }

    #[test_case("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq -"; "kiwipete")]
    #[test_case("r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - -"; "midgame")]
    #[test_case("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - -"; "endgame")]
    #[test_case("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ -"; "promotion race")]
    fn evaluation_is_antisymmetric_under_mirroring(fen: &str) {
        let board = Board::from_str(fen).unwrap();
        let mirrored = Board::from_str(&mirrored_fen(fen)).unwrap();

        assert_eq!(static_eval(&board), -static_eval(&mirrored));
    }

    #[test]
    fn the_starting_position_is_balanced() {
        assert_eq!(static_eval(&Board::starting_position()), 0);
    }

    #[test]
    fn extra_material_shows_up_in_the_sign() {
        let up_a_queen =
            Board::from_str("rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -").unwrap();
        let down_a_rook =
            Board::from_str("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/1NBQKBNR w Kkq -").unwrap();

        assert!(static_eval(&up_a_queen) > 400);
        assert!(static_eval(&down_a_rook) < -300);
    }

    #[test]
    fn evaluations_never_reach_the_mate_range() {
        let lopsided = Board::from_str("6qk/8/8/8/8/8/8/KQQQQQQ1 w - -").unwrap();

        assert!(!crate::score::is_mate(static_eval(&lopsided)));
    }
}
