//! Lines shown on the blocking surface.

use rand::seq::SliceRandom;

const QUOTES: &[&str] = &[
    "Close this app and get back to what matters!",
    "Your future self will thank you for closing this now.",
    "Distractions are temporary, but your goals are permanent. Stay focused!",
    "This app can wait. Your dreams cannot.",
    "Be stronger than your distractions.",
    "Remember why you started.",
    "Every second counts. Make them count.",
    "Study now, celebrate later!",
    "Every page you read takes you closer to success.",
    "Focus on the textbook, not the notifications.",
    "Success is the sum of small efforts repeated day in and day out.",
    "Focus on being productive instead of busy.",
    "Don't watch the clock; do what it does. Keep going.",
    "Don't stop when you're tired. Stop when you're done.",
    "Sometimes later becomes never. Do it now.",
    "Small progress is still progress.",
    "Strive for progress, not perfection.",
    "Discipline is the bridge between goals and accomplishment.",
    "Be stronger than your excuses.",
    "Work hard in silence. Let success make the noise.",
];

/// A random quote.
pub fn random_quote() -> &'static str {
    QUOTES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(QUOTES[0])
}

pub fn all() -> &'static [&'static str] {
    QUOTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_quote_comes_from_catalogue() {
        for _ in 0..20 {
            assert!(all().contains(&random_quote()));
        }
    }
}
