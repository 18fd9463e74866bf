use castor_bootstrap::{bits, BitBoard, Direction, Square, ZobristMap, ZobristPieces};

// The attack tables and Zobrist constants are computed by the build script
// and included here as `static` items: CROSS_SLIDES/CROSS_META,
// DIAGONAL_SLIDES/DIAGONAL_META, RAY_SLIDES/RAY_META, FREE_RAYS,
// KNIGHT_ATTACKS, KING_ATTACKS, BETWEEN and ZOBRIST_MAP.
#[derive(Clone, Copy)]
struct Metadata {
    offset: usize,
    mask: BitBoard,
}

include!(concat!(env!("OUT_DIR"), "/tables.rs"));

/// Every square a rook on `origin` can reach, given the occupied squares in
/// `blockers`. The first blocker on each ray is included; blockers on edge
/// squares make no difference.
pub(crate) fn rook_slides(origin: Square, blockers: BitBoard) -> BitBoard {
    let metadata = CROSS_META[origin];

    // SAFETY: PEXT against the mask yields an index within this square's
    // table span.
    *unsafe {
        CROSS_SLIDES.get_unchecked(metadata.offset + bits::pext(blockers.0, metadata.mask.0) as usize)
    }
}

/// Every square a bishop on `origin` can reach, given the occupied squares
/// in `blockers`. The first blocker on each ray is included.
pub(crate) fn bishop_slides(origin: Square, blockers: BitBoard) -> BitBoard {
    let metadata = DIAGONAL_META[origin];

    // SAFETY: As in `rook_slides`.
    *unsafe {
        DIAGONAL_SLIDES
            .get_unchecked(metadata.offset + bits::pext(blockers.0, metadata.mask.0) as usize)
    }
}

/// A single weakly blocked ray: the squares from `origin` (exclusive) along
/// `direction`, truncated to include the first square of `blockers` hit.
/// Everything not in `blockers` is transparent.
pub(crate) fn ray_slides(origin: Square, direction: Direction, blockers: BitBoard) -> BitBoard {
    let metadata = RAY_META[direction.as_index() * 64 + origin.as_index()];

    // SAFETY: As in `rook_slides`.
    *unsafe {
        RAY_SLIDES.get_unchecked(metadata.offset + bits::pext(blockers.0, metadata.mask.0) as usize)
    }
}

/// The unobstructed ray from `origin` (exclusive) to the board edge.
pub(crate) fn free_ray(origin: Square, direction: Direction) -> BitBoard {
    FREE_RAYS[direction.as_index() * 64 + origin.as_index()]
}

/// The squares a knight on `origin` jumps to.
pub(crate) fn knight_attacks(origin: Square) -> BitBoard {
    KNIGHT_ATTACKS[origin]
}

/// The up-to-eight squares adjacent to `origin`.
pub(crate) fn king_attacks(origin: Square) -> BitBoard {
    KING_ATTACKS[origin]
}

/// The open segment strictly between two aligned squares, or the empty
/// bitboard when they share no rank, file or diagonal.
pub(crate) fn line_between(a: Square, b: Square) -> BitBoard {
    BETWEEN[a.as_index() * 64 + b.as_index()]
}

/// Zobrist hash contributions. A position's fingerprint is the XOR of one
/// constant per piece placement, one per castling-rights configuration, one
/// per en-passant file, and a toggle folded in whenever black is to move.
pub(crate) mod zobrist {
    use castor_bootstrap::{Color, Square};

    use super::{ZobristPieces, ZOBRIST_MAP};
    use crate::repr::{CastlingRights, Piece, PieceKind};

    pub(crate) fn piece(piece: Piece, square: Square) -> u64 {
        let pieces: &ZobristPieces = match piece.color {
            Color::White => &ZOBRIST_MAP.white,
            Color::Black => &ZOBRIST_MAP.black,
        };

        (match piece.kind {
            PieceKind::King => &pieces.king,
            PieceKind::Queen => &pieces.queen,
            PieceKind::Rook => &pieces.rook,
            PieceKind::Bishop => &pieces.bishop,
            PieceKind::Knight => &pieces.knight,
            PieceKind::Pawn => &pieces.pawn,
        })[square]
    }

    /// The side-to-move toggle. XORed into the hash by every move, and once
    /// at construction when black starts.
    pub(crate) fn black_to_move() -> u64 {
        ZOBRIST_MAP.black_to_move
    }

    pub(crate) fn castling_rights(rights: CastlingRights) -> u64 {
        ZOBRIST_MAP.castling_rights[rights.as_index()]
    }

    /// The contribution of a double-push file, or zero when there is none.
    pub(crate) fn en_passant_file(file: Option<u8>) -> u64 {
        file.map_or(0, |file| ZOBRIST_MAP.en_passant_file[file as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_rays_match_unblocked_slides() {
        for square in Square::ALL {
            for direction in Direction::ALL {
                assert_eq!(
                    ray_slides(square, direction, BitBoard::EMPTY),
                    free_ray(square, direction),
                );
            }
        }
    }

    #[test]
    fn slides_are_ray_unions() {
        let blockers = BitBoard::from(Square::D6) | Square::F4.into() | Square::B2.into();

        for square in [Square::D4, Square::A1, Square::H8] {
            let straights = [
                Direction::North,
                Direction::East,
                Direction::South,
                Direction::West,
            ]
            .into_iter()
            .fold(BitBoard::EMPTY, |acc, direction| {
                acc | ray_slides(square, direction, blockers)
            });

            assert_eq!(rook_slides(square, blockers), straights);
        }
    }

    #[test]
    fn rook_slides_stop_at_blockers() {
        let blockers = BitBoard::from(Square::D6) | Square::G4.into();
        let slides = rook_slides(Square::D4, blockers);

        assert!(slides.get_bit(Square::D6));
        assert!(!slides.get_bit(Square::D7));
        assert!(slides.get_bit(Square::G4));
        assert!(!slides.get_bit(Square::H4));
        assert!(slides.get_bit(Square::A4));
        assert!(slides.get_bit(Square::D1));
    }

    #[test]
    fn bishop_slides_stop_at_blockers() {
        let blockers = BitBoard::from(Square::F6);
        let slides = bishop_slides(Square::D4, blockers);

        assert!(slides.get_bit(Square::F6));
        assert!(!slides.get_bit(Square::G7));
        assert!(slides.get_bit(Square::A1));
        assert!(slides.get_bit(Square::A7));
        assert!(!slides.get_bit(Square::H8));
    }

    #[test]
    fn knight_and_king_tables_have_expected_counts() {
        assert_eq!(knight_attacks(Square::A1).count_ones(), 2);
        assert_eq!(knight_attacks(Square::D4).count_ones(), 8);
        assert_eq!(king_attacks(Square::A1).count_ones(), 3);
        assert_eq!(king_attacks(Square::E4).count_ones(), 8);
        assert!(!king_attacks(Square::E4).get_bit(Square::E4));
    }

    #[test]
    fn between_is_the_open_segment() {
        assert_eq!(
            line_between(Square::A1, Square::D4),
            BitBoard::from(Square::B2) | Square::C3.into()
        );
        assert_eq!(line_between(Square::A1, Square::A2), BitBoard::EMPTY);
        assert_eq!(line_between(Square::A1, Square::B3), BitBoard::EMPTY);
        assert_eq!(
            line_between(Square::H8, Square::H5),
            BitBoard::from(Square::H7) | Square::H6.into()
        );
    }
}
