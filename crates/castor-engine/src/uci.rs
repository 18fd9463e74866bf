//! The UCI text frontend: reads commands from standard input, drives the
//! engine handle, and prints `info`/`bestmove` lines from its callbacks.

use std::{
    fmt::Write as _,
    io::{self, BufRead},
    str::FromStr,
};

use castor_core::board::Board;
use castor_search::search::SearchReport;

use crate::engine::{Engine, GoOptions};

const NAME: &str = concat!("Castor ", env!("CARGO_PKG_VERSION"));

fn print_info(report: &SearchReport) {
    let mut line = format!(
        "info depth {} time {} nodes {} nps {} hashfull {}",
        report.depth,
        report.elapsed.as_millis(),
        report.nodes,
        report.nps,
        report.hashfull,
    );

    match report.score.mate {
        Some(mate) => {
            let _ = write!(line, " score mate {mate}");
        }
        None => {
            let _ = write!(line, " score cp {}", report.score.centipawns);
        }
    }

    if report.score.lower_bound {
        line.push_str(" lowerbound");
    }

    if report.score.upper_bound {
        line.push_str(" upperbound");
    }

    if !report.pv.is_empty() {
        line.push_str(" pv");

        for chess_move in &report.pv {
            let _ = write!(line, " {chess_move}");
        }
    }

    println!("{line}");
}

/// Runs the command loop until `quit` or the input stream closes.
pub fn run(hash_mib: usize) -> io::Result<()> {
    let mut engine = Engine::new(
        Board::starting_position(),
        hash_mib,
        |report| print_info(&report),
        |chess_move, _| println!("bestmove {chess_move}"),
    );

    for line in io::stdin().lock().lines() {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens.split_first() {
            Some((&"uci", _)) => {
                println!("id name {NAME}");
                println!("id author the Castor developers");
                println!("option name Hash type spin default {hash_mib} min 1 max 16384");
                println!("option name Clear Hash type button");
                println!("uciok");
            }
            Some((&"isready", _)) => println!("readyok"),
            Some((&"ucinewgame", _)) => {
                if engine.clear_hash().is_err() {
                    tracing::warn!("ucinewgame received while searching");
                }
            }
            Some((&"position", rest)) => handle_position(&mut engine, rest),
            Some((&"go", rest)) => handle_go(&mut engine, rest),
            Some((&"stop", _)) => engine.stop(),
            Some((&"ponderhit", _)) => engine.ponderhit(),
            Some((&"setoption", rest)) => handle_setoption(&mut engine, rest),
            Some((&"quit", _)) => break,
            Some((unknown, _)) => tracing::warn!(command = *unknown, "unknown command ignored"),
            None => {}
        }
    }

    Ok(())
}

fn handle_position(engine: &mut Engine, tokens: &[&str]) {
    let moves_at = tokens.iter().position(|&token| token == "moves");
    let (setup, moves) = match moves_at {
        Some(index) => (&tokens[..index], &tokens[index + 1..]),
        None => (tokens, &[][..]),
    };

    let start = match setup.split_first() {
        Some((&"startpos", _)) => Ok(Board::starting_position()),
        Some((&"fen", fen_tokens)) => Board::from_str(&fen_tokens.join(" "))
            .map_err(|error| tracing::warn!(%error, "invalid fen")),
        _ => {
            tracing::warn!("position requires `startpos` or `fen`");

            return;
        }
    };

    let Ok(start) = start else {
        return;
    };

    if let Err(error) = engine.set_position(start, moves) {
        tracing::warn!(%error, "position command rejected");
    }
}

fn handle_go(engine: &mut Engine, tokens: &[&str]) {
    let mut options = GoOptions::default();
    let mut cursor = tokens.iter().peekable();

    fn number(cursor: &mut std::iter::Peekable<std::slice::Iter<&str>>) -> Option<u64> {
        cursor.next().and_then(|token| token.parse().ok())
    }

    while let Some(&token) = cursor.next() {
        match token {
            "searchmoves" => {
                while let Some(&&text) = cursor.peek() {
                    match engine.board().interpret_move(text) {
                        Ok(chess_move) => {
                            options.searchmoves.push(chess_move);
                            cursor.next();
                        }
                        Err(_) => break,
                    }
                }
            }
            "ponder" => options.ponder = true,
            "wtime" => options.wtime = number(&mut cursor),
            "btime" => options.btime = number(&mut cursor),
            "winc" => options.winc = number(&mut cursor),
            "binc" => options.binc = number(&mut cursor),
            "movestogo" => options.moves_togo = number(&mut cursor),
            "depth" => options.depth = number(&mut cursor).map(|depth| depth as u32),
            "movetime" => options.move_time = number(&mut cursor),
            "infinite" => options.infinite = true,
            _ => tracing::warn!(token, "unknown go argument ignored"),
        }
    }

    engine.go(options);
}

fn handle_setoption(engine: &mut Engine, tokens: &[&str]) {
    // setoption name <name...> [value <value>]
    let Some(name_at) = tokens.iter().position(|&token| token == "name") else {
        return;
    };

    let value_at = tokens.iter().position(|&token| token == "value");
    let name = tokens[name_at + 1..value_at.unwrap_or(tokens.len())]
        .join(" ")
        .to_ascii_lowercase();
    let value = value_at.map(|index| tokens[index + 1..].join(" "));

    match name.as_str() {
        "hash" => {
            let Some(size_mib) = value.and_then(|value| value.parse().ok()) else {
                tracing::warn!("Hash requires a numeric value");

                return;
            };

            if let Err(error) = engine.resize(size_mib) {
                tracing::warn!(%error, "resize rejected");
            }
        }
        "clear hash" => {
            if let Err(error) = engine.clear_hash() {
                tracing::warn!(%error, "clear hash rejected");
            }
        }
        _ => tracing::warn!(option = name, "unknown option ignored"),
    }
}
