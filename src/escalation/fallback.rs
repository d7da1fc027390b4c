//! Local advice when the remote analyzer is unavailable.

use crate::exercise::ExerciseKind;

/// Scores below this get corrective squat advice
const SQUAT_CORRECTIVE_BELOW: u8 = 70;

pub fn fallback_advice(kind: ExerciseKind, last_score: u8) -> String {
    let advice = match kind {
        ExerciseKind::Squat if last_score < SQUAT_CORRECTIVE_BELOW => {
            "Sit back a little more, keep knees tracking over your toes, and go down until thighs are near parallel before standing up."
        }
        ExerciseKind::Squat => "Squat looks stable. Keep your core braced and your knees in line with your feet.",
        ExerciseKind::Pushup => {
            "Keep your body in one straight line and your elbows around 45 degrees on the way down. Don't let your hips sag."
        }
        ExerciseKind::Plank => {
            "Keep head, shoulders, hips and ankles in line. Squeeze abs and glutes, and avoid piking or sagging."
        }
        ExerciseKind::JumpingJack => "Good rhythm. Keep breathing steadily and control the range of your arms.",
    };
    advice.to_string()
}
