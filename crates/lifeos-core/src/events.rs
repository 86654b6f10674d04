//! Conventional event names shared by producers and consumers.
//!
//! The bus does not validate names; these constants only keep the
//! `domain:action` namespace consistent across modules.

// Navigation
pub const NAVIGATION_CHANGED: &str = "navigation:changed";
pub const TAB_SWITCHED: &str = "tab:switched";

// State
pub const STATE_CHANGED: &str = "state:changed";
pub const STATE_HYDRATED: &str = "state:hydrated";

// Module lifecycle
pub const MODULE_REGISTERED: &str = "module:registered";
pub const MODULE_INITIALIZED: &str = "module:initialized";
pub const MODULE_ERROR: &str = "module:error";
pub const MODULE_LOADED: &str = "module:loaded";
pub const MODULE_RENDERED: &str = "module:rendered";

// App
pub const APP_READY: &str = "app:ready";

// Tasks
pub const TASK_ADDED: &str = "task:added";
pub const TASK_UPDATED: &str = "task:updated";
pub const TASK_COMPLETED: &str = "task:completed";
pub const TASK_REMOVED: &str = "task:removed";

// Goals
pub const GOAL_ADDED: &str = "goal:added";
pub const GOAL_UPDATED: &str = "goal:updated";
pub const GOAL_COMPLETED: &str = "goal:completed";

// Habits
pub const HABIT_ADDED: &str = "habit:added";
pub const HABIT_CHECKED: &str = "habit:checked";
pub const HABIT_REMOVED: &str = "habit:removed";

// Mood
pub const MOOD_LOGGED: &str = "mood:logged";

// Journal
pub const JOURNAL_SAVED: &str = "journal:saved";

// Finance
pub const TRANSACTION_ADDED: &str = "finance:transaction-added";
pub const TRANSACTION_REMOVED: &str = "finance:transaction-removed";

// Pomodoro
pub const POMODORO_STARTED: &str = "pomodoro:started";
pub const POMODORO_COMPLETED: &str = "pomodoro:completed";

// Metrics / theme
pub const METRICS_UPDATED: &str = "metrics:updated";
pub const THEME_CHANGED: &str = "theme:changed";

/// Every conventional name, for diagnostics.
pub const ALL: &[&str] = &[
    NAVIGATION_CHANGED,
    TAB_SWITCHED,
    STATE_CHANGED,
    STATE_HYDRATED,
    MODULE_REGISTERED,
    MODULE_INITIALIZED,
    MODULE_ERROR,
    MODULE_LOADED,
    MODULE_RENDERED,
    APP_READY,
    TASK_ADDED,
    TASK_UPDATED,
    TASK_COMPLETED,
    TASK_REMOVED,
    GOAL_ADDED,
    GOAL_UPDATED,
    GOAL_COMPLETED,
    HABIT_ADDED,
    HABIT_CHECKED,
    HABIT_REMOVED,
    MOOD_LOGGED,
    JOURNAL_SAVED,
    TRANSACTION_ADDED,
    TRANSACTION_REMOVED,
    POMODORO_STARTED,
    POMODORO_COMPLETED,
    METRICS_UPDATED,
    THEME_CHANGED,
];

/// Whether `name` is one of the conventional names above.
pub fn is_known(name: &str) -> bool {
    ALL.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let set: HashSet<_> = ALL.iter().collect();
        assert_eq!(set.len(), ALL.len());
    }

    #[test]
    fn names_follow_domain_action_form() {
        for name in ALL {
            let (domain, action) = name.split_once(':').unwrap();
            assert!(!domain.is_empty(), "{name}");
            assert!(!action.is_empty(), "{name}");
        }
    }

    #[test]
    fn known_lookup() {
        assert!(is_known("task:added"));
        assert!(!is_known("task:exploded"));
    }
}
