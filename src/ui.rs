use colored::{ColoredString, Colorize};
use declarative::{CheckOutcome, ConvergenceState};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Icon for a one-shot check outcome
pub fn outcome_icon(outcome: &CheckOutcome) -> ColoredString {
    match outcome {
        CheckOutcome::Converged => "✓".green(),
        CheckOutcome::Applied => "↻".cyan(),
        CheckOutcome::Diverged => "≠".yellow(),
        CheckOutcome::Failed { .. } => "✗".red(),
    }
}

/// Short label for a one-shot check outcome
pub fn outcome_label(outcome: &CheckOutcome) -> ColoredString {
    match outcome {
        CheckOutcome::Converged => "converged".green(),
        CheckOutcome::Applied => "applied".cyan(),
        CheckOutcome::Diverged => "diverged".yellow(),
        CheckOutcome::Failed { .. } => "failed".red(),
    }
}

/// Short label for a tracked convergence state
pub fn state_label(state: ConvergenceState) -> ColoredString {
    let text = state.to_string();
    match state {
        ConvergenceState::Converged => text.green(),
        ConvergenceState::Diverged => text.yellow(),
        ConvergenceState::Applying => text.cyan(),
        ConvergenceState::Unknown => text.dimmed(),
    }
}

/// "1 resource", "2 resources"
pub fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

// ============================================================================
// Tests
// ============================================================================
