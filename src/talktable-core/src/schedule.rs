//! Turn sequencing.
//!
//! The scheduler walks a precomputed list of [`Step`]s. Debaters alternate
//! starting with debater A, two debater turns form a round, and the moderator
//! speaks at every round boundary. The close of round k and the open of
//! round k+1 are a single moderator turn ([`Step::RoundTransition`]):
//!
//! ```text
//! Intro, RoundOpen(1), A(1), B(2), Transition(1->2), A(3), B(4), RoundClose(2), Conclusion
//! ```

use crate::participant::Seat;

/// One scheduled turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Announces the topic and both debaters. Always turn 0.
    Intro,
    /// Opens the first round.
    RoundOpen { round: u32 },
    /// One debater speaks. `turn_number` counts debater turns from 1.
    Debater { turn_number: u32, seat: Seat },
    /// Summarizes `closing` and opens `closing + 1`.
    RoundTransition { closing: u32 },
    /// Summarizes the final round.
    RoundClose { round: u32 },
    /// Summarizes the whole session.
    Conclusion,
}

impl Step {
    pub fn is_moderator(&self) -> bool {
        !matches!(self, Step::Debater { .. })
    }

    pub fn seat(&self) -> Seat {
        match self {
            Step::Debater { seat, .. } => *seat,
            _ => Seat::Moderator,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Step::Intro => "Introduction".to_string(),
            Step::RoundOpen { round } => format!("Round {} opening", round),
            Step::Debater { turn_number, .. } => format!("Turn {}", turn_number),
            Step::RoundTransition { closing } => {
                format!("Round {} close / round {} opening", closing, closing + 1)
            }
            Step::RoundClose { round } => format!("Round {} close", round),
            Step::Conclusion => "Conclusion".to_string(),
        }
    }
}

/// Seat speaking at zero-indexed debater turn `index`.
fn seat_for(index: u32) -> Seat {
    if index % 2 == 0 {
        Seat::DebaterA
    } else {
        Seat::DebaterB
    }
}

/// Full step sequence for a session of `max_rounds` rounds.
pub fn plan(max_rounds: u32) -> Vec<Step> {
    let debater_turns = max_rounds * 2;
    let mut steps = Vec::with_capacity((debater_turns + max_rounds + 3) as usize);

    steps.push(Step::Intro);
    for turn in 0..debater_turns {
        if turn % 2 == 0 {
            let round = turn / 2 + 1;
            if round == 1 {
                steps.push(Step::RoundOpen { round });
            } else {
                steps.push(Step::RoundTransition { closing: round - 1 });
            }
        }
        steps.push(Step::Debater {
            turn_number: turn + 1,
            seat: seat_for(turn),
        });
    }
    if max_rounds > 0 {
        steps.push(Step::RoundClose { round: max_rounds });
    }
    steps.push(Step::Conclusion);

    steps
}
