use rand::{distributions::Standard, prelude::Distribution, Rng};

fn square_randoms<R: Rng + ?Sized>(rng: &mut R) -> [u64; 64] {
    let mut randoms = [0u64; 64];
    rng.fill(&mut randoms[..]);

    randoms
}

#[derive(Debug)]
/// Per-square random constants for the six piece kinds of one color.
pub struct ZobristPieces {
    pub king: [u64; 64],
    pub queen: [u64; 64],
    pub rook: [u64; 64],
    pub bishop: [u64; 64],
    pub knight: [u64; 64],
    pub pawn: [u64; 64],
}

impl Distribution<ZobristPieces> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ZobristPieces {
        ZobristPieces {
            king: square_randoms(rng),
            queen: square_randoms(rng),
            rook: square_randoms(rng),
            bishop: square_randoms(rng),
            knight: square_randoms(rng),
            pawn: square_randoms(rng),
        }
    }
}

#[derive(Debug)]
/// Every random constant that goes into a position fingerprint: one constant
/// per (color, piece kind, square), one per castling-rights configuration
/// (2^4 of them), one per en-passant file, and a side-to-move toggle that is
/// folded in when black is to move.
pub struct ZobristMap {
    pub white: ZobristPieces,
    pub black: ZobristPieces,
    pub castling_rights: [u64; 16],
    pub en_passant_file: [u64; 8],
    pub black_to_move: u64,
}

impl Distribution<ZobristMap> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ZobristMap {
        ZobristMap {
            white: rng.gen(),
            black: rng.gen(),
            castling_rights: rng.gen(),
            en_passant_file: rng.gen(),
            black_to_move: rng.gen(),
        }
    }
}
