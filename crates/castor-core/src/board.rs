use std::{
    fmt::{self, Display},
    num::ParseIntError,
    str::FromStr,
};

use castor_bootstrap::{BitBoard, Color, ParseColorError, ParseSquareError, Square};

use crate::{
    index::{self, zobrist},
    mg,
    repr::{
        CastleSide, CastlingRights, Move, MoveKind, ParsePieceKindError, Piece, PieceKind, Side,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A full position: the twelve piece bitboards (kept pairwise disjoint),
/// the game metadata, and the incrementally maintained Zobrist hash.
pub struct Board {
    pub white: Side,
    pub black: Side,
    pub active: Color,
    pub castling: CastlingRights,
    /// The file of a pawn that just advanced two squares, if any; governs
    /// en-passant availability.
    pub double_push_file: Option<u8>,
    pub halfmove_clock: u8,
    pub full_moves: u16,
    hash: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("move is not legal in this position")]
pub struct MakeMoveError;

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ParseMoveError {
    #[error("move must be four or five characters of long algebraic notation")]
    Malformed,
    #[error("invalid square")]
    InvalidSquare(#[from] ParseSquareError),
    #[error("invalid promotion piece")]
    InvalidPromotion(#[from] ParsePieceKindError),
    #[error("move is not legal in this position")]
    Illegal,
}

impl Board {
    pub fn starting_position() -> Self {
        Self::from_str("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").unwrap()
    }

    /// The position fingerprint, maintained incrementally by
    /// [`Board::make_move_unchecked`].
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn side(&self, color: Color) -> &Side {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub(crate) fn side_mut(&mut self, color: Color) -> &mut Side {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn occupation(&self) -> BitBoard {
        self.white.occupation | self.black.occupation
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.white
            .kind_at(square)
            .map(|kind| Piece::new(kind, Color::White))
            .or_else(|| {
                self.black
                    .kind_at(square)
                    .map(|kind| Piece::new(kind, Color::Black))
            })
    }

    /// The pieces of `attacker` that attack `square`, through the given
    /// occupancy.
    pub(crate) fn attackers_on(
        &self,
        square: Square,
        attacker: Color,
        occupation: BitBoard,
    ) -> BitBoard {
        let enemy = self.side(attacker);
        let square_bb: BitBoard = square.into();

        (index::rook_slides(square, occupation) & (enemy.rooks | enemy.queens))
            | (index::bishop_slides(square, occupation) & (enemy.bishops | enemy.queens))
            | (index::knight_attacks(square) & enemy.knights)
            | (index::king_attacks(square) & enemy.king)
            | ((square_bb.move_one_down_left(attacker) | square_bb.move_one_down_right(attacker))
                & enemy.pawns)
    }

    pub fn in_check(&self, color: Color) -> bool {
        let king = self.side(color).king.try_into().unwrap();

        !self.attackers_on(king, !color, self.occupation()).is_empty()
    }

    /// Every square `color` defends: attacked squares including those
    /// occupied by its own pieces.
    pub fn defend_map(&self, color: Color) -> BitBoard {
        let side = self.side(color);
        let occupation = self.occupation();

        let mut defended =
            side.pawns.move_one_up_left(color) | side.pawns.move_one_up_right(color);

        for origin in (side.rooks | side.queens).bits() {
            defended |= index::rook_slides(origin, occupation);
        }

        for origin in (side.bishops | side.queens).bits() {
            defended |= index::bishop_slides(origin, occupation);
        }

        for origin in side.knights.bits() {
            defended |= index::knight_attacks(origin);
        }

        if let Ok(king) = Square::try_from(side.king) {
            defended |= index::king_attacks(king);
        }

        defended
    }

    /// Every square `color` attacks; its own pieces are not attack targets.
    pub fn attack_map(&self, color: Color) -> BitBoard {
        self.defend_map(color) - self.side(color).occupation
    }

    fn toggle_piece_hashed(&mut self, kind: PieceKind, color: Color, square: Square) {
        self.side_mut(color).toggle_piece(kind, square);
        self.hash ^= zobrist::piece(Piece::new(kind, color), square);
    }

    fn set_castling(&mut self, rights: CastlingRights) {
        self.hash ^= zobrist::castling_rights(self.castling) ^ zobrist::castling_rights(rights);
        self.castling = rights;
    }

    fn set_double_push_file(&mut self, file: Option<u8>) {
        self.hash ^=
            zobrist::en_passant_file(self.double_push_file) ^ zobrist::en_passant_file(file);
        self.double_push_file = file;
    }

    /// Applies a move, updating the hash by XORing in exactly the deltas of
    /// the squares, rights and files that change.
    ///
    /// # Safety
    /// The move must be legal in this position; applying anything else
    /// leaves the board in a nonsensical state.
    pub unsafe fn make_move_unchecked(&mut self, chess_move: Move) {
        let color = self.active;
        let origin = chess_move.origin();
        let target = chess_move.target();

        self.hash ^= zobrist::black_to_move();

        match chess_move.kind() {
            MoveKind::Castle => {
                let (rook_origin, rook_target) = match (color, chess_move.castle_side()) {
                    (Color::White, CastleSide::King) => (Square::H1, Square::F1),
                    (Color::White, CastleSide::Queen) => (Square::A1, Square::D1),
                    (Color::Black, CastleSide::King) => (Square::H8, Square::F8),
                    (Color::Black, CastleSide::Queen) => (Square::A8, Square::D8),
                };

                self.toggle_piece_hashed(PieceKind::King, color, origin);
                self.toggle_piece_hashed(PieceKind::King, color, target);
                self.toggle_piece_hashed(PieceKind::Rook, color, rook_origin);
                self.toggle_piece_hashed(PieceKind::Rook, color, rook_target);

                self.set_castling(self.castling.without_color(color));
                self.set_double_push_file(None);
                self.halfmove_clock = self.halfmove_clock.saturating_add(1);
            }
            MoveKind::EnPassant => {
                // SAFETY: An en-passant target is never on the back rank.
                let captured = unsafe { target.move_one_down_unchecked(color) };

                self.toggle_piece_hashed(PieceKind::Pawn, color, origin);
                self.toggle_piece_hashed(PieceKind::Pawn, color, target);
                self.toggle_piece_hashed(PieceKind::Pawn, !color, captured);

                self.set_double_push_file(None);
                self.halfmove_clock = 0;
            }
            MoveKind::Promotion => {
                self.toggle_piece_hashed(PieceKind::Pawn, color, origin);

                if let Some(captured) = self.side(!color).kind_at(target) {
                    self.toggle_piece_hashed(captured, !color, target);
                    self.set_castling(self.castling.without_rook_square(target));
                }

                self.toggle_piece_hashed(chess_move.promotion_kind().unwrap(), color, target);

                self.set_double_push_file(None);
                self.halfmove_clock = 0;
            }
            MoveKind::Normal => {
                let moved = self.side(color).kind_at(origin).unwrap();
                let captured = self.side(!color).kind_at(target);

                if let Some(captured) = captured {
                    self.toggle_piece_hashed(captured, !color, target);
                }

                self.toggle_piece_hashed(moved, color, origin);
                self.toggle_piece_hashed(moved, color, target);

                let mut rights = self
                    .castling
                    .without_rook_square(origin)
                    .without_rook_square(target);

                if moved == PieceKind::King {
                    rights = rights.without_color(color);
                }

                self.set_castling(rights);

                if moved == PieceKind::Pawn && origin.rank().abs_diff(target.rank()) == 2 {
                    self.set_double_push_file(Some(origin.file()));
                } else {
                    self.set_double_push_file(None);
                }

                if moved == PieceKind::Pawn || captured.is_some() {
                    self.halfmove_clock = 0;
                } else {
                    self.halfmove_clock = self.halfmove_clock.saturating_add(1);
                }
            }
        }

        self.full_moves += (color == Color::Black) as u16;
        self.active = !color;
    }

    pub fn make_move(&mut self, chess_move: Move) -> Result<(), MakeMoveError> {
        if mg::gen_moves(self).contains(&chess_move) {
            // SAFETY: The move was just found in the legal move list.
            unsafe {
                self.make_move_unchecked(chess_move);
            }

            Ok(())
        } else {
            Err(MakeMoveError)
        }
    }

    /// Resolves a move in long algebraic notation (`e2e4`, `e7e8q`) against
    /// the legal moves of this position. Castling arrives as the king's
    /// two-square move and en passant as a plain capture; both resolve to
    /// their special encodings here.
    pub fn interpret_move(&self, text: &str) -> Result<Move, ParseMoveError> {
        if !matches!(text.len(), 4 | 5) || !text.is_ascii() {
            return Err(ParseMoveError::Malformed);
        }

        let origin = Square::from_str(&text[0..2])?;
        let target = Square::from_str(&text[2..4])?;
        let promotion = match text.get(4..5) {
            Some(kind) => Some(PieceKind::from_str(kind)?),
            None => None,
        };

        mg::gen_moves(self)
            .into_iter()
            .find(|candidate| {
                candidate.origin() == origin
                    && candidate.target() == target
                    && candidate.promotion_kind() == promotion
            })
            .ok_or(ParseMoveError::Illegal)
    }

    pub fn perft(&self, depth: u32) -> u64 {
        let moves = mg::gen_moves(self);

        match depth {
            0 => 1,
            // Every move from depth one reaches a leaf, so the list length
            // is the node count.
            1 => moves.len() as u64,
            _ => moves
                .into_iter()
                .map(|chess_move| {
                    let mut child = *self;
                    // SAFETY: The move generator only produces legal moves.
                    unsafe {
                        child.make_move_unchecked(chess_move);
                    }

                    child.perft(depth - 1)
                })
                .sum(),
        }
    }

    pub fn gen_child_boards(&self) -> impl Iterator<Item = (Move, Board)> + '_ {
        mg::gen_moves(self).into_iter().map(|chess_move| {
            let mut child = *self;
            // SAFETY: The move generator only produces legal moves.
            unsafe {
                child.make_move_unchecked(chess_move);
            }

            (chess_move, child)
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ParseBoardError {
    #[error("fen must contain 4 to 6 space-separated parts")]
    InvalidPartAmount,
    #[error("board setup must contain 8 rows of at most 8 squares")]
    MalformedArrangement,
    #[error("invalid color")]
    InvalidColor(#[source] ParseColorError),
    #[error("castling rights may contain each of `K`, `Q`, `k` and `q` at most once")]
    InvalidCastlingRights,
    #[error("invalid en passant square")]
    InvalidEnPassantSquare(#[source] Option<ParseSquareError>),
    #[error("half-move clock must be a small non-negative integer")]
    InvalidHalfMoveClock(#[source] ParseIntError),
    #[error("full-move number must be a positive integer")]
    InvalidFullMoveNumber(#[source] ParseIntError),
    #[error("board must have exactly one king per side")]
    InvalidKingCount,
    #[error("board must not have pawns on the edge ranks")]
    PawnsOnEdgeRanks,
    #[error("side not to move must not be capturable")]
    CapturableKing,
}

fn parse_placement(placement: &str) -> Result<[Option<Piece>; 64], ParseBoardError> {
    let mut squares = [None; 64];
    let rows: Vec<&str> = placement.split('/').collect();

    if rows.len() != 8 {
        return Err(ParseBoardError::MalformedArrangement);
    }

    for (row_index, row) in rows.into_iter().enumerate() {
        let rank = 7 - row_index as u8;
        let mut file = 0u8;

        for character in row.chars() {
            if let Some(skip) = character.to_digit(10) {
                file += skip as u8;
            } else {
                let piece = Piece::from_fen_char(character)
                    .ok_or(ParseBoardError::MalformedArrangement)?;

                if file > 7 {
                    return Err(ParseBoardError::MalformedArrangement);
                }

                squares[Square::new(rank, file).as_index()] = Some(piece);
                file += 1;
            }
        }

        if file != 8 {
            return Err(ParseBoardError::MalformedArrangement);
        }
    }

    Ok(squares)
}

fn parse_castling_rights(text: &str) -> Result<CastlingRights, ParseBoardError> {
    if text == "-" {
        return Ok(CastlingRights::NONE);
    }

    let mut rights = CastlingRights::NONE;

    for character in text.chars() {
        let (color, side) = match character {
            'K' => (Color::White, CastleSide::King),
            'Q' => (Color::White, CastleSide::Queen),
            'k' => (Color::Black, CastleSide::King),
            'q' => (Color::Black, CastleSide::Queen),
            _ => return Err(ParseBoardError::InvalidCastlingRights),
        };

        if rights.can_castle(color, side) {
            return Err(ParseBoardError::InvalidCastlingRights);
        }

        rights = rights.with(color, side);
    }

    if text.is_empty() {
        return Err(ParseBoardError::InvalidCastlingRights);
    }

    Ok(rights)
}

impl FromStr for Board {
    type Err = ParseBoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(' ').collect();

        // The counters are optional; the perft suite conventionally leaves
        // them off.
        if !matches!(parts.len(), 4..=6) {
            return Err(ParseBoardError::InvalidPartAmount);
        }

        let squares = parse_placement(parts[0])?;
        let active = Color::from_str(parts[1]).map_err(ParseBoardError::InvalidColor)?;
        let mut castling = parse_castling_rights(parts[2])?;

        let en_passant_square = match parts[3] {
            "-" => None,
            square => Some(
                Square::from_str(square)
                    .map_err(|error| ParseBoardError::InvalidEnPassantSquare(Some(error)))?,
            ),
        };

        let halfmove_clock = match parts.get(4) {
            Some(text) => text
                .parse::<u8>()
                .map_err(ParseBoardError::InvalidHalfMoveClock)?,
            None => 0,
        };

        let full_moves = match parts.get(5) {
            Some(text) => text
                .parse::<u16>()
                .map_err(ParseBoardError::InvalidFullMoveNumber)?,
            None => 1,
        };

        let mut white = Side::blank();
        let mut black = Side::blank();

        for (index, piece) in squares.into_iter().enumerate() {
            if let Some(Piece { kind, color }) = piece {
                match color {
                    Color::White => &mut white,
                    Color::Black => &mut black,
                }
                .toggle_piece(kind, Square::ALL[index]);
            }
        }

        if !white.king.is_a_single_one() || !black.king.is_a_single_one() {
            return Err(ParseBoardError::InvalidKingCount);
        }

        if !((white.pawns | black.pawns) & BitBoard::EDGE_RANKS).is_empty() {
            return Err(ParseBoardError::PawnsOnEdgeRanks);
        }

        // Rights whose king or rook has left its home square are stale.
        for (color, king_home, rook_homes) in [
            (
                Color::White,
                Square::WHITE_KING,
                [
                    (CastleSide::King, Square::WHITE_KING_ROOK),
                    (CastleSide::Queen, Square::WHITE_QUEEN_ROOK),
                ],
            ),
            (
                Color::Black,
                Square::BLACK_KING,
                [
                    (CastleSide::King, Square::BLACK_KING_ROOK),
                    (CastleSide::Queen, Square::BLACK_QUEEN_ROOK),
                ],
            ),
        ] {
            let side = match color {
                Color::White => &white,
                Color::Black => &black,
            };

            for (_, rook_home) in rook_homes {
                if !side.king.get_bit(king_home) || !side.rooks.get_bit(rook_home) {
                    castling = castling.without_rook_square(rook_home);
                }
            }
        }

        let double_push_file = match en_passant_square {
            None => None,
            Some(square) => {
                let expected_rank = match active {
                    Color::White => 5,
                    Color::Black => 2,
                };

                if square.rank() != expected_rank {
                    return Err(ParseBoardError::InvalidEnPassantSquare(None));
                }

                // SAFETY: The target rank was just checked to be interior.
                let pawn_square = unsafe { square.move_one_down_unchecked(active) };
                let enemy_pawns = match active {
                    Color::White => black.pawns,
                    Color::Black => white.pawns,
                };

                if !enemy_pawns.get_bit(pawn_square) {
                    return Err(ParseBoardError::InvalidEnPassantSquare(None));
                }

                Some(square.file())
            }
        };

        let mut hash = squares
            .iter()
            .zip(Square::ALL)
            .filter_map(|(piece, square)| piece.map(|piece| zobrist::piece(piece, square)))
            .fold(0, |hash, delta| hash ^ delta);

        hash ^= zobrist::castling_rights(castling);
        hash ^= zobrist::en_passant_file(double_push_file);

        if active == Color::Black {
            hash ^= zobrist::black_to_move();
        }

        let board = Board {
            white,
            black,
            active,
            castling,
            double_push_file,
            halfmove_clock,
            full_moves,
            hash,
        };

        if board.in_check(!active) {
            return Err(ParseBoardError::CapturableKing);
        }

        Ok(board)
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            let mut gap = 0;

            for file in 0..8 {
                match self.piece_at(Square::new(rank, file)) {
                    Some(piece) => {
                        if gap != 0 {
                            gap.fmt(f)?;
                            gap = 0;
                        }

                        piece.fmt(f)?;
                    }
                    None => gap += 1,
                }
            }

            if gap != 0 {
                gap.fmt(f)?;
            }

            if rank != 0 {
                '/'.fmt(f)?;
            }
        }

        write!(f, " {} ", self.active)?;

        let mut rights = String::new();

        for (character, color, side) in [
            ('K', Color::White, CastleSide::King),
            ('Q', Color::White, CastleSide::Queen),
            ('k', Color::Black, CastleSide::King),
            ('q', Color::Black, CastleSide::Queen),
        ] {
            if self.castling.can_castle(color, side) {
                rights.push(character);
            }
        }

        if rights.is_empty() {
            rights.push('-');
        }

        write!(f, "{rights} ")?;

        match self.double_push_file {
            Some(file) => {
                let rank = match self.active {
                    Color::White => 5,
                    Color::Black => 2,
                };

                Square::new(rank, file).fmt(f)?;
            }
            None => '-'.fmt(f)?,
        }

        write!(f, " {} {}", self.halfmove_clock, self.full_moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    fn recomputed_hash(board: &Board) -> u64 {
        let mut hash = 0;

        for square in Square::ALL {
            if let Some(piece) = board.piece_at(square) {
                hash ^= zobrist::piece(piece, square);
            }
        }

        hash ^= zobrist::castling_rights(board.castling);
        hash ^= zobrist::en_passant_file(board.double_push_file);

        if board.active == Color::Black {
            hash ^= zobrist::black_to_move();
        }

        hash
    }

    fn assert_incremental_hashes(board: &Board, depth: u32) {
        assert_eq!(board.hash(), recomputed_hash(board), "{board}");

        if depth == 0 {
            return;
        }

        for (_, child) in board.gen_child_boards() {
            assert_incremental_hashes(&child, depth - 1);
        }
    }

    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 3; "starting position")]
    #[test_case("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1", 3; "kiwipete")]
    #[test_case("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8", 3; "promotions")]
    #[test_case("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", 4; "en passant endgame")]
    #[test_case("rnbqkbnr/ppp1pppp/8/8/1PPpP3/8/P2P1PPP/RNBQKBNR b KQkq c3 0 3", 3; "en passant available")]
    fn incremental_hash_matches_recomputation(fen: &str, depth: u32) {
        assert_incremental_hashes(&Board::from_str(fen).unwrap(), depth);
    }

    #[test]
    fn interpreting_resolves_special_moves() {
        let board =
            Board::from_str("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
                .unwrap();

        let castle = board.interpret_move("e1g1").unwrap();
        assert_eq!(castle.kind(), MoveKind::Castle);
        assert_eq!(castle.castle_side(), CastleSide::King);

        assert!(board.interpret_move("e1e8").is_err());
        assert!(board.interpret_move("xyzw").is_err());

        let mut with_en_passant =
            Board::from_str("rnbqkbnr/ppp1pppp/8/8/1PPpP3/8/P2P1PPP/RNBQKBNR b KQkq c3 0 3")
                .unwrap();
        let capture = with_en_passant.interpret_move("d4c3").unwrap();
        assert_eq!(capture.kind(), MoveKind::EnPassant);
        with_en_passant.make_move(capture).unwrap();
        assert_eq!(with_en_passant.piece_at(Square::C4), None);
    }

    #[test]
    fn captured_rooks_take_their_castle_right_along() {
        let mut board =
            Board::from_str("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
                .unwrap();

        // A bishop trade on h8 must clear black's king-side right.
        board.make_move(board.interpret_move("e5g6").unwrap()).unwrap();
        board.make_move(board.interpret_move("h3g2").unwrap()).unwrap();
        board.make_move(board.interpret_move("g6h8").unwrap()).unwrap();

        assert!(!board.castling.can_castle(Color::Black, CastleSide::King));
        assert!(board.castling.can_castle(Color::Black, CastleSide::Queen));
        assert_eq!(board.hash(), recomputed_hash(&board));
    }

    #[test_case("8/8/8/8/8/8/8/8 w - - 0 1"; "no kings")]
    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"; "bad color")]
    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkqK - 0 1"; "repeated right")]
    #[test_case("Pnbqkbnr/1ppppppp/8/8/8/8/PPPPPPP1/RNBQKBNR w KQkq - 0 1"; "pawn on edge rank")]
    #[test_case("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e6 0 1"; "phantom en passant")]
    #[test_case("4k3/8/8/8/8/8/8/4K2R w K"; "too few parts")]
    fn malformed_fens_are_rejected(fen: &str) {
        assert!(Board::from_str(fen).is_err());
    }

    #[test]
    fn stale_castling_rights_are_dropped() {
        let board = Board::from_str("4k3/8/8/8/8/8/8/R3K3 w KQkq - 0 1").unwrap();

        assert!(board.castling.can_castle(Color::White, CastleSide::Queen));
        assert!(!board.castling.can_castle(Color::White, CastleSide::King));
        assert!(!board.castling.can_castle(Color::Black, CastleSide::King));
    }
}
