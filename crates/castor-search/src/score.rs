use castor_bootstrap::Color;

/// A position score in centipawns from white's perspective. The extremes of
/// the range encode forced mates: "white is mated in n plies" is
/// `WORST_WHITE + n`, "black is mated in n plies" is `WORST_BLACK - n`, with
/// [`MAX_MATE_PLY`] keeping the two regions clear of ordinary scores.
pub type Eval = i32;

pub const WORST_WHITE: Eval = i32::MIN;
pub const WORST_BLACK: Eval = i32::MAX;
pub const MAX_MATE_PLY: Eval = 256;

pub fn worst_for(color: Color) -> Eval {
    match color {
        Color::White => WORST_WHITE,
        Color::Black => WORST_BLACK,
    }
}

pub fn white_is_mated(eval: Eval) -> bool {
    eval < WORST_WHITE + MAX_MATE_PLY
}

pub fn black_is_mated(eval: Eval) -> bool {
    eval > WORST_BLACK - MAX_MATE_PLY
}

pub fn is_mate(eval: Eval) -> bool {
    white_is_mated(eval) || black_is_mated(eval)
}

/// Clamps a heuristic score into the non-mate range, so that no static
/// evaluation can masquerade as a forced mate.
pub fn truncated(eval: Eval) -> Eval {
    if white_is_mated(eval) {
        WORST_WHITE + MAX_MATE_PLY
    } else if black_is_mated(eval) {
        WORST_BLACK - MAX_MATE_PLY
    } else {
        eval
    }
}

/// Whether `left` is a strictly better outcome than `right` for `color`.
/// Works for mate scores as well, preferring nearer mates to deliver and
/// farther mates to suffer.
pub fn is_better_for(color: Color, left: Eval, right: Eval) -> bool {
    match color {
        Color::White => left > right,
        Color::Black => left < right,
    }
}

/// Converts a mate score into the signed full-move distance reported over
/// UCI: positive when the engine (playing `engine_color`) delivers the mate,
/// negative when it suffers it.
pub fn mate_distance_moves(eval: Eval, engine_color: Color) -> Option<i32> {
    let (plies, mated) = if white_is_mated(eval) {
        (eval - WORST_WHITE, Color::White)
    } else if black_is_mated(eval) {
        (WORST_BLACK - eval, Color::Black)
    } else {
        return None;
    };

    let moves = (plies + 1) / 2;

    Some(if mated == engine_color { -moves } else { moves })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mate_regions_sit_at_the_extremes() {
        assert!(white_is_mated(WORST_WHITE));
        assert!(white_is_mated(WORST_WHITE + 3));
        assert!(!white_is_mated(WORST_WHITE + MAX_MATE_PLY));
        assert!(black_is_mated(WORST_BLACK - 1));
        assert!(!is_mate(0));
        assert!(!is_mate(2500));
    }

    #[test]
    fn truncation_clamps_into_the_normal_range() {
        assert_eq!(truncated(WORST_WHITE + 5), WORST_WHITE + MAX_MATE_PLY);
        assert_eq!(truncated(WORST_BLACK - 5), WORST_BLACK - MAX_MATE_PLY);
        assert_eq!(truncated(-120), -120);
        assert!(!is_mate(truncated(WORST_BLACK - 5)));
    }

    #[test]
    fn better_prefers_near_mates() {
        // Mating black in 1 ply beats mating black in 3.
        assert!(is_better_for(Color::White, WORST_BLACK - 1, WORST_BLACK - 3));
        // Being mated in 3 plies beats being mated in 1.
        assert!(is_better_for(Color::White, WORST_WHITE + 3, WORST_WHITE + 1));
        assert!(is_better_for(Color::Black, WORST_WHITE + 1, WORST_WHITE + 3));
    }

    #[test]
    fn mate_distances_report_in_moves() {
        assert_eq!(mate_distance_moves(WORST_BLACK - 1, Color::White), Some(1));
        assert_eq!(mate_distance_moves(WORST_BLACK - 3, Color::White), Some(2));
        assert_eq!(mate_distance_moves(WORST_WHITE + 2, Color::White), Some(-1));
        assert_eq!(mate_distance_moves(WORST_WHITE + 2, Color::Black), Some(1));
        assert_eq!(mate_distance_moves(50, Color::White), None);
    }
}
