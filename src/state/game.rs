//! Game state.
//!
//! The problem being solved, per-submission test results, and the final
//! outcome. Code is never executed locally; these types only carry what
//! the server reports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default language sent with submissions.
pub const DEFAULT_LANGUAGE: &str = "python";

/// One worked example of a problem.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProblemExample {
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub explanation: String,
}

/// Problem attached to a game. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<ProblemExample>,
    /// Starter code template
    #[serde(default)]
    pub template: String,
    /// Time limit in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
}

/// Result of the latest submission.
///
/// Ephemeral: superseded by the next result or cleared after the
/// display timeout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: u32,
    pub total: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub completed: bool,
    /// Runtime in milliseconds
    #[serde(default)]
    pub runtime: u64,
}

impl TestResult {
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// A test result plus the moment it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedResult {
    pub result: TestResult,
    pub received_at: DateTime<Utc>,
}

impl ReceivedResult {
    pub fn new(result: TestResult, received_at: DateTime<Utc>) -> Self {
        Self {
            result,
            received_at,
        }
    }

    /// Whether the display timeout has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, display_for: Duration) -> bool {
        let Ok(display_for) = chrono::Duration::from_std(display_for) else {
            return false;
        };
        now - self.received_at >= display_for
    }
}

/// One player's score at the end of a game.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalScore {
    pub name: String,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub total_tests: u32,
    #[serde(default)]
    pub completed: bool,
    /// Seconds from game start to the winning submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<f64>,
}

/// Game outcome. Terminal for the current lobby.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameFinished {
    pub winner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    #[serde(default)]
    pub final_scores: Vec<FinalScore>,
    /// Game length in seconds
    #[serde(default)]
    pub game_duration: f64,
}

impl GameFinished {
    pub fn is_winner(&self, name: &str) -> bool {
        self.winner == name
    }

    pub fn score_for(&self, name: &str) -> Option<&FinalScore> {
        self.final_scores.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_problem_from_server_json() {
        let problem: Problem = serde_json::from_value(serde_json::json!({
            "id": "two-sum",
            "title": "Two Sum",
            "description": "Return indices of the two numbers that add up to target.",
            "examples": [{
                "input": "[2,7,11,15]\n9",
                "output": "[0, 1]",
                "explanation": "Because nums[0] + nums[1] == 9."
            }],
            "template": "def two_sum(nums, target):\n    pass",
            "timeLimit": 300
        }))
        .unwrap();

        assert_eq!(problem.id, "two-sum");
        assert_eq!(problem.examples.len(), 1);
        assert_eq!(problem.time_limit, Some(300));
    }

    #[test]
    fn test_result_all_passed() {
        let mut result = TestResult {
            passed: 5,
            total: 5,
            ..TestResult::default()
        };
        assert!(result.all_passed());

        result.passed = 4;
        assert!(!result.all_passed());

        // An empty suite never counts as passing
        assert!(!TestResult::default().all_passed());
    }

    #[test]
    fn test_result_expiry() {
        let received_at = Utc::now();
        let received = ReceivedResult::new(TestResult::default(), received_at);
        let display_for = Duration::from_secs(5);

        assert!(!received.is_expired(received_at, display_for));
        assert!(!received.is_expired(received_at + chrono::Duration::seconds(4), display_for));
        assert!(received.is_expired(received_at + chrono::Duration::seconds(5), display_for));
    }

    #[test]
    fn test_game_finished_scores() {
        let finished: GameFinished = serde_json::from_value(serde_json::json!({
            "winner": "Ada",
            "winner_id": "c1",
            "final_scores": [
                {"name": "Ada", "tests_passed": 5, "total_tests": 5, "completed": true, "completion_time": 42.5},
                {"name": "Bob", "tests_passed": 2, "total_tests": 5, "completed": false, "completion_time": null}
            ],
            "game_duration": 42.5
        }))
        .unwrap();

        assert!(finished.is_winner("Ada"));
        assert!(!finished.is_winner("Bob"));
        assert_eq!(finished.score_for("Bob").unwrap().tests_passed, 2);
        assert!(finished.score_for("Bob").unwrap().completion_time.is_none());
        assert!(finished.score_for("Eve").is_none());
    }
}
