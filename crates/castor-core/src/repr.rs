use std::{
    fmt::{self, Display, Write},
    str::FromStr,
};

use arrayvec::ArrayVec;
use castor_bootstrap::{BitBoard, Color, Square};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A kind of chess piece, independent of its color.
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    /// The kinds a pawn can promote to, in the payload encoding order used
    /// by [`Move`].
    pub const PROMOTIONS: [Self; 4] = [Self::Queen, Self::Rook, Self::Bishop, Self::Knight];
}

impl Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(match self {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("piece kind must be one of `k`, `q`, `r`, `b`, `n` or `p`")]
pub struct ParsePieceKindError;

impl FromStr for PieceKind {
    type Err = ParsePieceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "k" => Ok(PieceKind::King),
            "q" => Ok(PieceKind::Queen),
            "r" => Ok(PieceKind::Rook),
            "b" => Ok(PieceKind::Bishop),
            "n" => Ok(PieceKind::Knight),
            "p" => Ok(PieceKind::Pawn),
            _ => Err(ParsePieceKindError),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A piece: a kind together with a color.
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    pub const fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }

    pub fn from_fen_char(character: char) -> Option<Self> {
        let kind = match character.to_ascii_lowercase() {
            'k' => PieceKind::King,
            'q' => PieceKind::Queen,
            'r' => PieceKind::Rook,
            'b' => PieceKind::Bishop,
            'n' => PieceKind::Knight,
            'p' => PieceKind::Pawn,
            _ => return None,
        };

        let color = if character.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };

        Some(Self { kind, color })
    }

    pub fn fen_char(&self) -> char {
        let character = match self.kind {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        };

        match self.color {
            Color::White => character.to_ascii_uppercase(),
            Color::Black => character,
        }
    }
}

impl Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(self.fen_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A castling flank, named after the piece standing next to the board edge.
pub enum CastleSide {
    King,
    Queen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The four castling rights as a 4-bit mask, one bit per (color, flank).
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const NONE: Self = Self(0);
    pub const FULL: Self = Self(0b1111);

    const fn bit(color: Color, side: CastleSide) -> u8 {
        match (color, side) {
            (Color::White, CastleSide::King) => 0b0001,
            (Color::White, CastleSide::Queen) => 0b0010,
            (Color::Black, CastleSide::King) => 0b0100,
            (Color::Black, CastleSide::Queen) => 0b1000,
        }
    }

    pub fn can_castle(&self, color: Color, side: CastleSide) -> bool {
        self.0 & Self::bit(color, side) != 0
    }

    pub fn with(self, color: Color, side: CastleSide) -> Self {
        Self(self.0 | Self::bit(color, side))
    }

    pub fn without_color(self, color: Color) -> Self {
        Self(self.0 & !(Self::bit(color, CastleSide::King) | Self::bit(color, CastleSide::Queen)))
    }

    /// Clears the right anchored at the given rook home square, if any. Other
    /// squares leave the rights untouched, so this can be applied blindly to
    /// the origin and target of every move.
    pub fn without_rook_square(self, square: Square) -> Self {
        let bit = match square {
            Square::A1 => Self::bit(Color::White, CastleSide::Queen),
            Square::H1 => Self::bit(Color::White, CastleSide::King),
            Square::A8 => Self::bit(Color::Black, CastleSide::Queen),
            Square::H8 => Self::bit(Color::Black, CastleSide::King),
            _ => 0,
        };

        Self(self.0 & !bit)
    }

    /// The rights as an index from 0 to 15, for the Zobrist table.
    pub fn as_index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The six piece bitboards of one color, with their union cached.
pub struct Side {
    pub king: BitBoard,
    pub queens: BitBoard,
    pub rooks: BitBoard,
    pub bishops: BitBoard,
    pub knights: BitBoard,
    pub pawns: BitBoard,
    pub occupation: BitBoard,
}

impl Side {
    pub fn blank() -> Self {
        Self {
            king: BitBoard::EMPTY,
            queens: BitBoard::EMPTY,
            rooks: BitBoard::EMPTY,
            bishops: BitBoard::EMPTY,
            knights: BitBoard::EMPTY,
            pawns: BitBoard::EMPTY,
            occupation: BitBoard::EMPTY,
        }
    }

    pub fn piece_bitboard(&self, kind: PieceKind) -> BitBoard {
        match kind {
            PieceKind::King => self.king,
            PieceKind::Queen => self.queens,
            PieceKind::Rook => self.rooks,
            PieceKind::Bishop => self.bishops,
            PieceKind::Knight => self.knights,
            PieceKind::Pawn => self.pawns,
        }
    }

    fn piece_bitboard_mut(&mut self, kind: PieceKind) -> &mut BitBoard {
        match kind {
            PieceKind::King => &mut self.king,
            PieceKind::Queen => &mut self.queens,
            PieceKind::Rook => &mut self.rooks,
            PieceKind::Bishop => &mut self.bishops,
            PieceKind::Knight => &mut self.knights,
            PieceKind::Pawn => &mut self.pawns,
        }
    }

    pub fn toggle_piece(&mut self, kind: PieceKind, square: Square) {
        self.piece_bitboard_mut(kind).toggle_bit(square);
        self.occupation.toggle_bit(square);
    }

    /// The kind of this side's piece on the given square, if any.
    pub fn kind_at(&self, square: Square) -> Option<PieceKind> {
        if !self.occupation.get_bit(square) {
            return None;
        }

        if self.pawns.get_bit(square) {
            Some(PieceKind::Pawn)
        } else if self.rooks.get_bit(square) {
            Some(PieceKind::Rook)
        } else if self.knights.get_bit(square) {
            Some(PieceKind::Knight)
        } else if self.bishops.get_bit(square) {
            Some(PieceKind::Bishop)
        } else if self.queens.get_bit(square) {
            Some(PieceKind::Queen)
        } else {
            Some(PieceKind::King)
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// A move packed into sixteen bits: origin (6), target (6), payload (2) and
/// special kind (2). The payload carries the castling flank of a castle or
/// the promotion piece of a promotion. Castles store the king's origin and
/// target, so a move displays without board context.
pub struct Move(u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Normal,
    Castle,
    EnPassant,
    Promotion,
}

impl Move {
    /// The all-zero move, used as a "no move" marker in the transposition
    /// table. It decodes as an A1-to-A1 move, which no position allows.
    pub const NULL: Self = Self(0);

    const TARGET_SHIFT: u16 = 6;
    const PAYLOAD_SHIFT: u16 = 12;
    const KIND_SHIFT: u16 = 14;

    pub fn new(origin: Square, target: Square) -> Self {
        Self(origin.as_index() as u16 | (target.as_index() as u16) << Self::TARGET_SHIFT)
    }

    pub fn promotion(origin: Square, target: Square, kind: PieceKind) -> Self {
        let payload = match kind {
            PieceKind::Queen => 0,
            PieceKind::Rook => 1,
            PieceKind::Bishop => 2,
            PieceKind::Knight => 3,
            _ => unreachable!("promotion must be to a queen, rook, bishop or knight"),
        };

        Self(
            Self::new(origin, target).0
                | payload << Self::PAYLOAD_SHIFT
                | (MoveKind::Promotion as u16) << Self::KIND_SHIFT,
        )
    }

    pub fn en_passant(origin: Square, target: Square) -> Self {
        Self(Self::new(origin, target).0 | (MoveKind::EnPassant as u16) << Self::KIND_SHIFT)
    }

    pub fn castle(side: CastleSide, color: Color) -> Self {
        let (origin, target) = match (color, side) {
            (Color::White, CastleSide::King) => (Square::E1, Square::G1),
            (Color::White, CastleSide::Queen) => (Square::E1, Square::C1),
            (Color::Black, CastleSide::King) => (Square::E8, Square::G8),
            (Color::Black, CastleSide::Queen) => (Square::E8, Square::C8),
        };

        Self(
            Self::new(origin, target).0
                | (side as u16) << Self::PAYLOAD_SHIFT
                | (MoveKind::Castle as u16) << Self::KIND_SHIFT,
        )
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn origin(&self) -> Square {
        Square::try_from((self.0 & 0b111111) as u8).unwrap()
    }

    pub fn target(&self) -> Square {
        Square::try_from((self.0 >> Self::TARGET_SHIFT & 0b111111) as u8).unwrap()
    }

    pub fn kind(&self) -> MoveKind {
        match self.0 >> Self::KIND_SHIFT {
            0 => MoveKind::Normal,
            1 => MoveKind::Castle,
            2 => MoveKind::EnPassant,
            _ => MoveKind::Promotion,
        }
    }

    /// The promotion piece, for promotion moves.
    pub fn promotion_kind(&self) -> Option<PieceKind> {
        if self.kind() != MoveKind::Promotion {
            return None;
        }

        Some(match self.0 >> Self::PAYLOAD_SHIFT & 0b11 {
            0 => PieceKind::Queen,
            1 => PieceKind::Rook,
            2 => PieceKind::Bishop,
            _ => PieceKind::Knight,
        })
    }

    /// The castling flank, for castle moves.
    pub fn castle_side(&self) -> CastleSide {
        if self.0 >> Self::PAYLOAD_SHIFT & 0b11 == 0 {
            CastleSide::King
        } else {
            CastleSide::Queen
        }
    }

    /// The raw sixteen bits, as stored in transposition-table nodes.
    pub fn as_bits(&self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }
}

impl Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.origin().fmt(f)?;
        self.target().fmt(f)?;

        if let Some(kind) = self.promotion_kind() {
            kind.fmt(f)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Move({self})")
    }
}

/// The maximum number of legal moves a position can have; no known position
/// exceeds 218, so a 256-slot list never overflows.
pub const MAX_MOVES: usize = 256;

/// The output buffer of move generation. Lives on the stack.
pub type MoveList = ArrayVec<Move, MAX_MOVES>;

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    #[test_case(Square::E2, Square::E4, "e2e4")]
    #[test_case(Square::G8, Square::F6, "g8f6")]
    fn normal_moves_encode_their_squares(origin: Square, target: Square, text: &str) {
        let chess_move = Move::new(origin, target);

        assert_eq!(chess_move.origin(), origin);
        assert_eq!(chess_move.target(), target);
        assert_eq!(chess_move.kind(), MoveKind::Normal);
        assert_eq!(chess_move.promotion_kind(), None);
        assert_eq!(chess_move.to_string(), text);
    }

    #[test]
    fn promotions_carry_their_piece() {
        for kind in PieceKind::PROMOTIONS {
            let chess_move = Move::promotion(Square::B7, Square::B8, kind);

            assert_eq!(chess_move.kind(), MoveKind::Promotion);
            assert_eq!(chess_move.promotion_kind(), Some(kind));
            assert_eq!(chess_move.to_string(), format!("b7b8{kind}"));
        }
    }

    #[test]
    fn castles_display_as_king_moves() {
        let short = Move::castle(CastleSide::King, Color::White);
        let long = Move::castle(CastleSide::Queen, Color::Black);

        assert_eq!(short.to_string(), "e1g1");
        assert_eq!(short.castle_side(), CastleSide::King);
        assert_eq!(long.to_string(), "e8c8");
        assert_eq!(long.castle_side(), CastleSide::Queen);
        assert_eq!(short.kind(), MoveKind::Castle);
    }

    #[test]
    fn moves_survive_the_table_representation() {
        let moves = [
            Move::new(Square::A2, Square::A3),
            Move::en_passant(Square::D5, Square::E6),
            Move::promotion(Square::C7, Square::B8, PieceKind::Knight),
            Move::castle(CastleSide::Queen, Color::White),
        ];

        for chess_move in moves {
            assert_eq!(Move::from_bits(chess_move.as_bits()), chess_move);
        }
    }

    #[test]
    fn rights_clear_by_square_and_color() {
        let rights = CastlingRights::FULL;

        let after = rights.without_rook_square(Square::H1);
        assert!(!after.can_castle(Color::White, CastleSide::King));
        assert!(after.can_castle(Color::White, CastleSide::Queen));

        let after = rights.without_color(Color::Black);
        assert!(!after.can_castle(Color::Black, CastleSide::King));
        assert!(!after.can_castle(Color::Black, CastleSide::Queen));
        assert!(after.can_castle(Color::White, CastleSide::King));

        assert_eq!(rights.without_rook_square(Square::E4), rights);
    }
}
