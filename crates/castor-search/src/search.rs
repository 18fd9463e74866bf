use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use castor_bootstrap::Color;
use castor_core::{
    board::Board,
    mg,
    repr::{Move, MoveList},
};

use crate::{
    eval,
    score::{self, Eval},
    tt::{Bound, TranspositionTable, MAX_DEPTH},
};

#[derive(Debug, Clone, Copy)]
/// The score part of a depth report: centipawns from the engine's
/// perspective, a signed mate distance in moves when one is forced, and
/// whether the stored value is only a window bound.
pub struct ScoreReport {
    pub centipawns: Eval,
    pub mate: Option<i32>,
    pub lower_bound: bool,
    pub upper_bound: bool,
}

#[derive(Debug, Clone)]
/// Progress emitted after every completed iterative-deepening step.
pub struct SearchReport {
    pub depth: u32,
    pub elapsed: Duration,
    pub nodes: u64,
    pub nps: u64,
    pub hashfull: u32,
    pub score: ScoreReport,
    pub pv: Vec<Move>,
}

/// One search worker's state: the shared table, the hashes of positions
/// already played on the board, the hashes of the line currently being
/// explored, and the cooperative stop flag polled at every node.
pub struct Search<'a> {
    tt: &'a TranspositionTable,
    played: &'a [u64],
    run: &'a AtomicBool,
    line: Vec<u64>,
    pub nodes: u64,
}

impl<'a> Search<'a> {
    pub fn new(tt: &'a TranspositionTable, played: &'a [u64], run: &'a AtomicBool) -> Self {
        Self {
            tt,
            played,
            run,
            line: Vec::with_capacity(MAX_DEPTH as usize + 1),
            nodes: 0,
        }
    }

    fn should_run(&self) -> bool {
        self.run.load(Ordering::Relaxed)
    }

    fn occurrences(&self, hash: u64) -> usize {
        self.played.iter().filter(|&&seen| seen == hash).count()
            + self.line.iter().filter(|&&seen| seen == hash).count()
    }

    /// The recursive alpha-beta evaluation of `board` to `depth_left` plies,
    /// from white's perspective. White improves `alpha`, black improves
    /// `beta`; a score outside the window cuts the node off. Results go
    /// through a table writer which either publishes them or, when the stop
    /// flag drops mid-node, restores the slot untouched. The return value is
    /// garbage once the stop flag is down.
    pub fn alpha_beta(
        &mut self,
        board: &Board,
        mut alpha: Eval,
        mut beta: Eval,
        depth_left: u8,
    ) -> Eval {
        if !self.should_run() {
            return 0;
        }

        self.nodes += 1;

        let color = board.active;
        let hash = board.hash();
        let worst = score::worst_for(color);

        let mut writer = self.tt.reserve(hash);

        // This is the third time the position stands on the board: any
        // recurrence is an immediate draw claim, at every depth.
        if self.played.iter().filter(|&&seen| seen == hash).count() >= 2 {
            writer.write_eval(Bound::Exact, MAX_DEPTH, 0, Move::NULL);
            writer.flush();

            return 0;
        }

        // The position already occurs in the hypothetical line; repeating
        // it would head for a draw.
        if self.line.contains(&hash) {
            writer.write_static_eval(0);
            writer.flush();

            return 0;
        }

        if writer.is_hit() && writer.original_depth() >= depth_left {
            // Served blindly, a stored move can walk a winning position
            // into a threefold repetition. Only trust the entry if its move
            // does not complete one.
            let completes_repetition = writer.original_depth() > 0
                && !writer.original_move().is_null()
                && {
                    let mut child = *board;

                    child.make_move(writer.original_move()).is_ok()
                        && self.occurrences(child.hash()) >= 2
                };

            if !completes_repetition {
                let (bound, stored) = writer.original_eval();

                let usable = match bound {
                    Bound::Exact => true,
                    Bound::Lower => stored > beta,
                    Bound::Upper => stored < alpha,
                };

                if usable {
                    writer.update_generation();
                    writer.flush();

                    return stored;
                }
            }
        }

        if depth_left == 0 {
            let static_eval = eval::static_eval(board);

            writer.write_static_eval(static_eval);
            writer.flush();

            return static_eval;
        }

        let mut moves = mg::gen_moves(board);

        if moves.is_empty() {
            let terminal = if board.in_check(color) { worst } else { 0 };

            writer.write_eval(Bound::Exact, depth_left, terminal, Move::NULL);
            writer.flush();

            return terminal;
        }

        // The previously best move is still the most promising; trying it
        // first tightens the window soonest.
        if writer.is_hit() && writer.original_depth() > 0 && writer.original_eval().1 != worst {
            let stored = writer.original_move();

            if stored.is_null() {
                // Nothing useful stored.
            } else if let Some(position) = moves.iter().position(|&candidate| candidate == stored)
            {
                moves.swap(0, position);
            } else {
                tracing::debug!(%stored, "stored best move is not legal in this position");
            }
        }

        let (entry_alpha, entry_beta) = (alpha, beta);
        let mut best_eval = worst;
        let mut best_move = Move::NULL;

        self.line.push(hash);

        for &chess_move in moves.iter() {
            let mut child = *board;
            // SAFETY: The move generator only produces legal moves.
            unsafe {
                child.make_move_unchecked(chess_move);
            }

            let child_eval = self.alpha_beta(&child, alpha, beta, depth_left - 1);

            if score::is_better_for(color, child_eval, best_eval) {
                best_eval = child_eval;
                best_move = chess_move;
            }

            // A score beyond the window is one the opponent prevents by
            // force; the remaining moves cannot matter.
            match color {
                Color::White => {
                    if best_eval > beta {
                        break;
                    }

                    alpha = alpha.max(best_eval);
                }
                Color::Black => {
                    if best_eval < alpha {
                        break;
                    }

                    beta = beta.min(best_eval);
                }
            }
        }

        self.line.pop();

        // Push the mate horizon one ply outward on the way up.
        if score::white_is_mated(best_eval) {
            best_eval += 1;
        } else if score::black_is_mated(best_eval) {
            best_eval -= 1;
        }

        if !self.should_run() {
            writer.abort();

            return 0;
        }

        let bound = if best_eval > entry_beta {
            Bound::Lower
        } else if best_eval < entry_alpha {
            Bound::Upper
        } else {
            Bound::Exact
        };

        writer.write_eval(bound, depth_left, best_eval, best_move);
        writer.flush();

        best_eval
    }

    /// Root search over a caller-supplied move subset; internal nodes are
    /// unrestricted. The window starts fully open.
    pub fn alpha_beta_restricted_root(
        &mut self,
        board: &Board,
        moves: &MoveList,
        depth_left: u8,
    ) -> Eval {
        self.nodes += 1;

        let color = board.active;
        let hash = board.hash();
        let mut alpha = score::WORST_WHITE;
        let mut beta = score::WORST_BLACK;

        let mut writer = self.tt.reserve(hash);

        if writer.is_hit() && writer.original_depth() >= depth_left {
            let (_, stored) = writer.original_eval();

            writer.update_generation();
            writer.flush();

            return stored;
        }

        let mut best_eval = score::worst_for(color);
        let mut best_move = moves[0];

        self.line.push(hash);

        for &chess_move in moves.iter() {
            if !self.should_run() {
                break;
            }

            let mut child = *board;
            // SAFETY: The caller passes verified legal moves.
            unsafe {
                child.make_move_unchecked(chess_move);
            }

            let child_eval = self.alpha_beta(&child, alpha, beta, depth_left - 1);

            if score::is_better_for(color, child_eval, best_eval) {
                best_eval = child_eval;
                best_move = chess_move;
            }

            match color {
                Color::White => {
                    if best_eval > beta {
                        break;
                    }

                    alpha = alpha.max(best_eval);
                }
                Color::Black => {
                    if best_eval < alpha {
                        break;
                    }

                    beta = beta.min(best_eval);
                }
            }
        }

        self.line.pop();

        if !self.should_run() {
            writer.abort();

            return 0;
        }

        writer.write_eval(Bound::Exact, depth_left, best_eval, best_move);
        writer.flush();

        best_eval
    }

    /// Iterative deepening up to `max_depth`, bumping the table generation
    /// before each step and reporting progress after it. Stops early when
    /// the run flag drops.
    pub fn iterative_deepen(
        &mut self,
        board: &Board,
        restricted: Option<&MoveList>,
        max_depth: u32,
        mut on_depth: impl FnMut(SearchReport),
    ) {
        let start = Instant::now();

        for depth in 1..=max_depth.min(MAX_DEPTH as u32) {
            if !self.should_run() {
                break;
            }

            self.tt.bump_generation();
            self.line.clear();

            match restricted {
                Some(moves) => {
                    self.alpha_beta_restricted_root(board, moves, depth as u8);
                }
                None => {
                    self.alpha_beta(board, score::WORST_WHITE, score::WORST_BLACK, depth as u8);
                }
            }

            if !self.should_run() {
                break;
            }

            if let Some(report) = self.report(board, depth, start) {
                on_depth(report);
            }
        }
    }

    fn report(&self, board: &Board, depth: u32, start: Instant) -> Option<SearchReport> {
        let node = self.tt.lookup(board.hash())?;
        let elapsed = start.elapsed();
        let millis = elapsed.as_millis().max(1);

        let centipawns = match board.active {
            Color::White => node.eval,
            Color::Black => node.eval.saturating_neg(),
        };

        Some(SearchReport {
            depth,
            elapsed,
            nodes: self.nodes,
            nps: (self.nodes as u128 * 1000 / millis) as u64,
            hashfull: self.tt.fill_permille(),
            score: ScoreReport {
                centipawns,
                mate: score::mate_distance_moves(node.eval, board.active),
                lower_bound: node.bound == Bound::Lower,
                upper_bound: node.bound == Bound::Upper,
            },
            pv: self.principal_variation(board, depth),
        })
    }

    /// Walks the stored best moves from the root, stopping at static-eval
    /// nodes, reservations, or anything no longer legal.
    fn principal_variation(&self, board: &Board, max_length: u32) -> Vec<Move> {
        let mut pv = Vec::new();
        let mut cursor = *board;

        while pv.len() < max_length as usize {
            let Some(node) = self.tt.lookup(cursor.hash()) else {
                break;
            };

            if node.depth == 0 || node.in_use || node.best_move.is_null() {
                break;
            }

            if cursor.make_move(node.best_move).is_err() {
                break;
            }

            pv.push(node.best_move);
        }

        pv
    }
}
