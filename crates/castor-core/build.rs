use std::{
    array, env,
    fmt::Debug,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::PathBuf,
};

use castor_bootstrap::{BitBoard, Direction, Square, ZobristMap};
use rand::{rngs::StdRng, Rng, SeedableRng};

const SEED: u64 = 0xCA57_0B0A_12D3_99E5;

// Mirrors the definition in src/index.rs; the derived Debug output of both
// this struct and BitBoard is valid constant syntax, which is what lets the
// tables below be written as plain Rust source.
#[derive(Clone, Copy, Debug)]
#[allow(dead_code)]
struct Metadata {
    offset: usize,
    mask: BitBoard,
}

/// The ray from `square` (exclusive) to the board edge.
fn free_ray(square: Square, direction: Direction) -> BitBoard {
    let mut ray = BitBoard::EMPTY;
    let mut cursor = BitBoard::from(square).shift(direction);

    while !cursor.is_empty() {
        ray |= cursor;
        cursor = cursor.shift(direction);
    }

    ray
}

/// The relevant occupancy of a ray: its inner squares. The edge terminal is
/// reached whether or not it is occupied, so it carries no information.
fn ray_mask(square: Square, direction: Direction) -> BitBoard {
    free_ray(square, direction) & BitBoard::FULL.shift(direction.opposite())
}

/// The ray truncated to include the first blocker, if any.
fn blocked_ray(square: Square, direction: Direction, blockers: BitBoard) -> BitBoard {
    let mut ray = BitBoard::EMPTY;
    let mut cursor = BitBoard::from(square).shift(direction);

    while !cursor.is_empty() {
        ray |= cursor;

        if !(cursor & blockers).is_empty() {
            break;
        }

        cursor = cursor.shift(direction);
    }

    ray
}

const STRAIGHTS: [Direction; 4] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
];

const DIAGONALS: [Direction; 4] = [
    Direction::NorthEast,
    Direction::SouthEast,
    Direction::SouthWest,
    Direction::NorthWest,
];

fn union(directions: [Direction; 4], ray_fn: impl Fn(Direction) -> BitBoard) -> BitBoard {
    directions
        .into_iter()
        .fold(BitBoard::EMPTY, |acc, direction| acc | ray_fn(direction))
}

fn cross_slides(square: Square, blockers: BitBoard) -> BitBoard {
    union(STRAIGHTS, |direction| blocked_ray(square, direction, blockers))
}

fn diagonal_slides(square: Square, blockers: BitBoard) -> BitBoard {
    union(DIAGONALS, |direction| blocked_ray(square, direction, blockers))
}

fn cross_mask(square: Square) -> BitBoard {
    union(STRAIGHTS, |direction| ray_mask(square, direction))
}

fn diagonal_mask(square: Square) -> BitBoard {
    union(DIAGONALS, |direction| ray_mask(square, direction))
}

/// Builds a flat PEXT-indexed slide table. Each square's span holds one
/// entry per subset of its relevant-occupancy mask; the carry-rippler subset
/// order matches the PEXT index order, so the entries land at
/// `offset + pext(blockers, mask)`.
fn gen_slide_table(
    mask_fn: impl Fn(Square) -> BitBoard,
    slide_fn: impl Fn(Square, BitBoard) -> BitBoard,
) -> (Vec<BitBoard>, [Metadata; 64]) {
    let mut table = Vec::new();
    let mut metadata = [Metadata {
        offset: 0,
        mask: BitBoard::EMPTY,
    }; 64];

    for square in Square::ALL {
        let mask = mask_fn(square);

        metadata[square] = Metadata {
            offset: table.len(),
            mask,
        };

        table.extend(mask.subsets().map(|subset| slide_fn(square, subset)));
    }

    (table, metadata)
}

/// Per-direction variant of the slide tables, direction-major: the entry
/// group for `(direction, square)` starts at `RAY_META[direction * 64 +
/// square].offset`.
fn gen_ray_tables() -> (Vec<BitBoard>, Vec<Metadata>, Vec<BitBoard>) {
    let mut table = Vec::new();
    let mut metadata = Vec::new();
    let mut free = Vec::new();

    for direction in Direction::ALL {
        for square in Square::ALL {
            free.push(free_ray(square, direction));

            let mask = ray_mask(square, direction);

            metadata.push(Metadata {
                offset: table.len(),
                mask,
            });

            table.extend(
                mask.subsets()
                    .map(|subset| blocked_ray(square, direction, subset)),
            );
        }
    }

    (table, metadata, free)
}

fn knight_jumps(piece: BitBoard) -> BitBoard {
    let north = piece.shift(Direction::North);
    let south = piece.shift(Direction::South);
    let east = piece.shift(Direction::East);
    let west = piece.shift(Direction::West);

    north.shift(Direction::NorthEast)
        | north.shift(Direction::NorthWest)
        | south.shift(Direction::SouthEast)
        | south.shift(Direction::SouthWest)
        | east.shift(Direction::NorthEast)
        | east.shift(Direction::SouthEast)
        | west.shift(Direction::NorthWest)
        | west.shift(Direction::SouthWest)
}

fn king_area(piece: BitBoard) -> BitBoard {
    let line = piece.shift(Direction::West) | piece | piece.shift(Direction::East);

    (line.shift(Direction::North) | line | line.shift(Direction::South)) - piece
}

/// The open segment strictly between two aligned squares; empty when the
/// squares share no rank, file or diagonal.
fn between(a: Square, b: Square) -> BitBoard {
    let target: BitBoard = b.into();

    for direction in Direction::ALL {
        let mut segment = BitBoard::EMPTY;
        let mut cursor = BitBoard::from(a).shift(direction);

        while !cursor.is_empty() {
            if cursor == target {
                return segment;
            }

            segment |= cursor;
            cursor = cursor.shift(direction);
        }
    }

    BitBoard::EMPTY
}

fn write_table<T: Debug>(
    name: &str,
    data: &[T],
    type_name: &str,
    file: &mut File,
) -> io::Result<()> {
    write!(file, "static {name}: [{type_name}; {}] = [", data.len())?;

    for element in data {
        write!(file, "{element:?},")?;
    }

    writeln!(file, "];")
}

fn write_variable<T: Debug>(
    name: &str,
    data: &T,
    type_name: &str,
    file: &mut File,
) -> io::Result<()> {
    writeln!(file, "static {name}: {type_name} = {data:?};")
}

fn main() -> io::Result<()> {
    let mut output_file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(PathBuf::from(env::var_os("OUT_DIR").unwrap()).join("tables.rs"))?;

    let (cross_table, cross_metadata) = gen_slide_table(cross_mask, cross_slides);
    let (diagonal_table, diagonal_metadata) = gen_slide_table(diagonal_mask, diagonal_slides);
    let (ray_table, ray_metadata, free_rays) = gen_ray_tables();

    write_table("CROSS_SLIDES", &cross_table, "BitBoard", &mut output_file)?;
    write_table("CROSS_META", &cross_metadata, "Metadata", &mut output_file)?;
    write_table(
        "DIAGONAL_SLIDES",
        &diagonal_table,
        "BitBoard",
        &mut output_file,
    )?;
    write_table(
        "DIAGONAL_META",
        &diagonal_metadata,
        "Metadata",
        &mut output_file,
    )?;
    write_table("RAY_SLIDES", &ray_table, "BitBoard", &mut output_file)?;
    write_table("RAY_META", &ray_metadata, "Metadata", &mut output_file)?;
    write_table("FREE_RAYS", &free_rays, "BitBoard", &mut output_file)?;

    write_table(
        "KNIGHT_ATTACKS",
        &Square::ALL.map(|square| knight_jumps(square.into())),
        "BitBoard",
        &mut output_file,
    )?;
    write_table(
        "KING_ATTACKS",
        &Square::ALL.map(|square| king_area(square.into())),
        "BitBoard",
        &mut output_file,
    )?;

    write_table(
        "BETWEEN",
        &array::from_fn::<_, { 64 * 64 }, _>(|index| {
            between(Square::ALL[index / 64], Square::ALL[index % 64])
        }),
        "BitBoard",
        &mut output_file,
    )?;

    write_variable(
        "ZOBRIST_MAP",
        &StdRng::seed_from_u64(SEED).gen::<ZobristMap>(),
        "ZobristMap",
        &mut output_file,
    )?;

    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
