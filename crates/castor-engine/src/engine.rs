use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use castor_bootstrap::Color;
use castor_core::{
    board::{Board, ParseMoveError},
    mg,
    repr::{Move, MoveList},
};
use castor_search::{
    score,
    search::{Search, SearchReport},
    tt::TranspositionTable,
};

pub type InfoCallback = Arc<dyn Fn(SearchReport) + Send + Sync>;
pub type BestMoveCallback = Arc<dyn Fn(Move, Color) + Send + Sync>;

#[derive(Debug, Clone, Default)]
/// The search controls of a `go` command. Everything is optional; a bare
/// `go` searches without any limit until stopped.
pub struct GoOptions {
    /// Restrict the root to these moves. Entries that are not legal in the
    /// root position are dropped.
    pub searchmoves: Vec<Move>,
    /// Time-management flag only; the search itself is unaffected.
    pub ponder: bool,
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub moves_togo: Option<u64>,
    pub depth: Option<u32>,
    pub move_time: Option<u64>,
    pub infinite: bool,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("a search is still running")]
    Busy,
    #[error("invalid move in position setup")]
    InvalidMove(#[source] ParseMoveError),
}

struct Timer {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// The engine handle: owns the transposition table, the current root
/// position, and at most two helper threads (the search worker and an
/// optional stop timer). All cancellation is cooperative through a shared
/// run flag the search polls at every node.
pub struct Engine {
    tt: Arc<TranspositionTable>,
    root: Board,
    played: Arc<Vec<u64>>,
    run: Arc<AtomicBool>,
    report_best: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    timer: Option<Timer>,
    info: InfoCallback,
    best_move: BestMoveCallback,
    pondering: bool,
}

impl Engine {
    pub fn new(
        root: Board,
        size_mib: usize,
        info: impl Fn(SearchReport) + Send + Sync + 'static,
        best_move: impl Fn(Move, Color) + Send + Sync + 'static,
    ) -> Self {
        Self {
            tt: Arc::new(TranspositionTable::new(size_mib)),
            root,
            played: Arc::new(Vec::new()),
            run: Arc::new(AtomicBool::new(false)),
            report_best: Arc::new(AtomicBool::new(false)),
            worker: None,
            timer: None,
            info: Arc::new(info),
            best_move: Arc::new(best_move),
            pondering: false,
        }
    }

    pub fn board(&self) -> &Board {
        &self.root
    }

    pub fn hash_size_mib(&self) -> usize {
        self.tt.size_mib()
    }

    /// Whether the search worker is alive.
    pub fn running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Replaces the root: replays the verified move texts from `start`,
    /// collecting the hash of every position that has actually stood on the
    /// board (the final one excluded) for repetition detection.
    pub fn set_position<S: AsRef<str>>(
        &mut self,
        start: Board,
        moves: &[S],
    ) -> Result<(), EngineError> {
        if self.running() {
            return Err(EngineError::Busy);
        }

        let mut board = start;
        let mut played = Vec::with_capacity(moves.len());

        for text in moves {
            let chess_move = board
                .interpret_move(text.as_ref())
                .map_err(EngineError::InvalidMove)?;

            played.push(board.hash());

            // SAFETY: `interpret_move` resolved the text against the legal
            // move list.
            unsafe {
                board.make_move_unchecked(chess_move);
            }
        }

        self.root = board;
        self.played = Arc::new(played);

        Ok(())
    }

    /// Starts a search; ignored when one is already running. The worker
    /// iteratively deepens until its depth limit or the run flag drops, and
    /// fires the bestmove callback exactly once as it exits.
    pub fn go(&mut self, options: GoOptions) {
        if self.running() {
            tracing::debug!("search already running, go ignored");

            return;
        }

        self.cancel_timer();
        self.reap_worker();

        let restricted = self.verified_searchmoves(&options.searchmoves);
        self.pondering = options.ponder;

        // The run flag must be up before any timer starts counting against
        // it.
        self.run.store(true, Ordering::Relaxed);
        self.report_best.store(true, Ordering::Relaxed);

        if let Some(budget) = self.think_budget(&options) {
            tracing::debug!(?budget, "searching on a clock");
            self.stop_after(budget);
        }

        let max_depth = options.depth.unwrap_or(u32::MAX);

        let tt = Arc::clone(&self.tt);
        let played = Arc::clone(&self.played);
        let run = Arc::clone(&self.run);
        let report_best = Arc::clone(&self.report_best);
        let info = Arc::clone(&self.info);
        let best_move = Arc::clone(&self.best_move);
        let root = self.root;

        self.worker = Some(thread::spawn(move || {
            let mut search = Search::new(&tt, &played, &run);
            search.iterative_deepen(&root, restricted.as_ref(), max_depth, |report| {
                info(report)
            });

            if !report_best.swap(false, Ordering::Relaxed) {
                return;
            }

            let node = tt.lookup(root.hash()).or_else(|| {
                // The root entry can fall out under heavy replacement; a
                // one-ply fill restores it.
                tracing::warn!("root position missing from the table, refilling one ply");

                let recovery = AtomicBool::new(true);
                let mut fill = Search::new(&tt, &played, &recovery);
                fill.alpha_beta(&root, score::WORST_WHITE, score::WORST_BLACK, 1);

                tt.lookup(root.hash())
            });

            match node {
                Some(node) if !node.best_move.is_null() => best_move(node.best_move, root.active),
                _ => tracing::error!("no best move available after the search"),
            }
        }));
    }

    /// Cancels the search: drops the run flag, cancels the timer and joins
    /// the worker. Idempotent; the bestmove callback has fired by the time
    /// this returns.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::Relaxed);
        self.cancel_timer();
        self.reap_worker();
    }

    pub fn ponderhit(&mut self) {
        self.pondering = false;
    }

    pub fn pondering(&self) -> bool {
        self.pondering
    }

    /// Reallocates the table, rehashing every live node. Refused while a
    /// search is running.
    pub fn resize(&mut self, size_mib: usize) -> Result<(), EngineError> {
        if self.running() {
            return Err(EngineError::Busy);
        }

        self.tt = Arc::new(self.tt.resized(size_mib));

        Ok(())
    }

    pub fn clear_hash(&mut self) -> Result<(), EngineError> {
        if self.running() {
            return Err(EngineError::Busy);
        }

        self.tt.clear();

        Ok(())
    }

    fn verified_searchmoves(&self, searchmoves: &[Move]) -> Option<MoveList> {
        if searchmoves.is_empty() {
            return None;
        }

        let legal = mg::gen_moves(&self.root);
        let mut verified = MoveList::new();

        for &candidate in searchmoves {
            if legal.contains(&candidate) {
                verified.push(candidate);
            } else {
                tracing::warn!(%candidate, "searchmoves entry is not legal, dropped");
            }
        }

        if verified.is_empty() {
            None
        } else {
            Some(verified)
        }
    }

    /// The wall-clock budget for this search, if it should have one. An
    /// explicit movetime is used as given. Otherwise, with the active
    /// clock known, a slice of it is taken: remaining / max(movestogo, 30)
    /// plus half the increment, never more than half the remaining time.
    fn think_budget(&self, options: &GoOptions) -> Option<Duration> {
        if let Some(movetime) = options.move_time {
            return Some(Duration::from_millis(movetime));
        }

        // While pondering, the clock belongs to the opponent; the frontend
        // stops us or promotes the search with ponderhit.
        if options.infinite || options.ponder {
            return None;
        }

        let (time, increment) = match self.root.active {
            Color::White => (options.wtime, options.winc),
            Color::Black => (options.btime, options.binc),
        };

        time.map(|remaining| {
            let divisor = options.moves_togo.unwrap_or(0).max(30);
            let slice = remaining / divisor + increment.unwrap_or(0) / 2;

            Duration::from_millis(slice.min(remaining / 2).max(1))
        })
    }

    /// Installs a timer that drops the run flag once `duration` passes. A
    /// previous timer is cancelled and waited out first.
    fn stop_after(&mut self, duration: Duration) {
        self.cancel_timer();

        let cancel = Arc::new(AtomicBool::new(false));
        let observed_cancel = Arc::clone(&cancel);
        let run = Arc::clone(&self.run);
        let deadline = Instant::now() + duration;

        let handle = thread::spawn(move || loop {
            if observed_cancel.load(Ordering::Relaxed) {
                return;
            }

            if Instant::now() >= deadline {
                run.store(false, Ordering::Relaxed);

                return;
            }

            thread::sleep(Duration::from_micros(500));
        });

        self.timer = Some(Timer { cancel, handle });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.store(true, Ordering::Relaxed);

            if timer.handle.join().is_err() {
                tracing::error!("timer thread panicked");
            }
        }
    }

    fn reap_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("search worker panicked");
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Going away is not a move request.
        self.report_best.store(false, Ordering::Relaxed);
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        str::FromStr,
        sync::Mutex,
    };

    type MoveLog = Arc<Mutex<Vec<(Move, Color)>>>;
    type ReportLog = Arc<Mutex<Vec<SearchReport>>>;

    fn engine_for(fen: &str, size_mib: usize) -> (Engine, MoveLog, ReportLog) {
        let moves: MoveLog = Arc::new(Mutex::new(Vec::new()));
        let reports: ReportLog = Arc::new(Mutex::new(Vec::new()));

        let move_log = Arc::clone(&moves);
        let report_log = Arc::clone(&reports);

        let engine = Engine::new(
            Board::from_str(fen).unwrap(),
            size_mib,
            move |report| report_log.lock().unwrap().push(report),
            move |chess_move, color| move_log.lock().unwrap().push((chess_move, color)),
        );

        (engine, moves, reports)
    }

    fn wait_until_idle(engine: &Engine) {
        let deadline = Instant::now() + Duration::from_secs(60);

        while engine.running() {
            assert!(Instant::now() < deadline, "search did not terminate");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn a_depth_limited_search_reports_one_legal_best_move() {
        let (mut engine, moves, reports) =
            engine_for("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 16);

        engine.go(GoOptions {
            depth: Some(4),
            ..GoOptions::default()
        });

        wait_until_idle(&engine);
        engine.stop();

        let moves = moves.lock().unwrap();
        assert_eq!(moves.len(), 1);

        let (best, color) = moves[0];
        assert_eq!(color, Color::White);
        assert!(mg::gen_moves(engine.board()).contains(&best));

        let reports = reports.lock().unwrap();
        assert_eq!(reports.last().unwrap().depth, 4);
    }

    #[test]
    fn mate_in_one_is_reported_as_such() {
        let (mut engine, moves, reports) = engine_for("4k3/8/4K3/8/8/8/8/6R1 w - -", 8);

        engine.go(GoOptions {
            depth: Some(3),
            ..GoOptions::default()
        });

        wait_until_idle(&engine);
        engine.stop();

        assert_eq!(moves.lock().unwrap()[0].0.to_string(), "g1g8");
        assert_eq!(reports.lock().unwrap().last().unwrap().score.mate, Some(1));
    }

    #[test]
    fn stop_is_idempotent_and_fires_the_callback_once() {
        let (mut engine, moves, _) =
            engine_for("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 16);

        engine.go(GoOptions {
            infinite: true,
            ..GoOptions::default()
        });

        thread::sleep(Duration::from_millis(100));
        engine.stop();
        engine.stop();

        assert_eq!(moves.lock().unwrap().len(), 1);
        assert!(!engine.running());
    }

    #[test]
    fn movetime_stops_the_search_by_itself() {
        let (mut engine, moves, _) =
            engine_for("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 16);

        engine.go(GoOptions {
            move_time: Some(150),
            ..GoOptions::default()
        });

        wait_until_idle(&engine);

        assert_eq!(moves.lock().unwrap().len(), 1);
    }

    #[test]
    fn position_replay_tracks_played_hashes() {
        let (mut engine, _, _) =
            engine_for("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 1);

        engine
            .set_position(
                Board::starting_position(),
                &["e2e4", "e7e5", "g1f3", "b8c6"],
            )
            .unwrap();

        assert_eq!(engine.played.len(), 4);
        assert_eq!(engine.board().active, Color::White);

        let result = engine.set_position(Board::starting_position(), &["e2e5"]);
        assert!(matches!(result, Err(EngineError::InvalidMove(_))));
    }

    #[test]
    fn a_warm_table_returns_the_same_move_with_less_work() {
        let (mut engine, moves, reports) =
            engine_for("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq -", 16);

        engine.go(GoOptions {
            depth: Some(3),
            ..GoOptions::default()
        });
        wait_until_idle(&engine);
        engine.stop();

        let cold_nodes = reports.lock().unwrap().last().unwrap().nodes;

        engine.go(GoOptions {
            depth: Some(3),
            ..GoOptions::default()
        });
        wait_until_idle(&engine);
        engine.stop();

        let warm_nodes = reports.lock().unwrap().last().unwrap().nodes;
        let moves = moves.lock().unwrap();

        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].0, moves[1].0);
        assert!(warm_nodes < cold_nodes);
    }

    #[test]
    fn resizing_while_idle_preserves_the_table() {
        let (mut engine, _, _) = engine_for("4k3/8/4K3/8/8/8/8/6R1 w - -", 1);

        engine.go(GoOptions {
            depth: Some(4),
            ..GoOptions::default()
        });
        wait_until_idle(&engine);
        engine.stop();

        let before = engine.tt.calculate_num_full();
        assert!(before > 0);

        engine.resize(20).unwrap();

        assert_eq!(engine.tt.calculate_num_full(), before);
        assert_eq!(engine.hash_size_mib(), 20);
    }

    #[test]
    fn searchmoves_restricts_the_root() {
        let (mut engine, moves, _) =
            engine_for("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 8);

        let restricted = engine.board().interpret_move("a2a3").unwrap();

        engine.go(GoOptions {
            searchmoves: vec![restricted],
            depth: Some(3),
            ..GoOptions::default()
        });

        wait_until_idle(&engine);
        engine.stop();

        assert_eq!(moves.lock().unwrap()[0].0, restricted);
    }
}
