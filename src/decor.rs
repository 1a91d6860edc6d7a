//! Panels, horizontal rules and progress lines for console output
//!
//! These are display helpers, not log records: they go to console sinks only
//! and never reach log files.

use std::time::Duration;

/// Width of a non-compact panel, borders included
pub const DEFAULT_PANEL_WIDTH: usize = 78;

const MIN_COMPACT_INNER_WIDTH: usize = 18;

/// Cells in a progress bar, brackets excluded
pub const PROGRESS_BAR_WIDTH: usize = 30;

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

/// Title placement for [`render_rule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

/// Terminal width, or a sensible default when not attached to a terminal
pub fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => DEFAULT_PANEL_WIDTH + 2,
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate_to(s: &str, width: usize) -> String {
    if char_len(s) <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn center(s: &str, width: usize) -> String {
    let len = char_len(s);
    if len >= width {
        return s.to_string();
    }
    let left = (width - len) / 2;
    let right = width - len - left;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))
}

/// Box `content` with rounded borders and an optional title
///
/// Compact panels shrink to the content; others use [`DEFAULT_PANEL_WIDTH`].
/// Over-long lines are truncated with an ellipsis.
pub fn render_panel(content: &str, title: Option<&str>, compact: bool) -> String {
    let content_lines: Vec<&str> = content.lines().collect();
    let title = title.filter(|t| !t.is_empty());

    let inner_width = if compact {
        let widest = content_lines.iter().map(|l| char_len(l) + 1).max().unwrap_or(0);
        let title_width = title.map(|t| char_len(t) + 2).unwrap_or(0);
        widest.max(title_width).max(MIN_COMPACT_INNER_WIDTH)
    } else {
        DEFAULT_PANEL_WIDTH - 2
    };

    let mut lines = Vec::with_capacity(content_lines.len() + 4);
    lines.push(format!("╭{}╮", "─".repeat(inner_width)));
    if let Some(title) = title {
        let title = truncate_to(title, inner_width.saturating_sub(2));
        lines.push(format!("│{}│", center(&format!(" {} ", title), inner_width)));
        lines.push(format!("├{}┤", "─".repeat(inner_width)));
    }
    for line in content_lines {
        let line = truncate_to(line, inner_width - 1);
        let pad = inner_width - 1 - char_len(&line);
        lines.push(format!("│ {}{}│", line, " ".repeat(pad)));
    }
    lines.push(format!("╰{}╯", "─".repeat(inner_width)));
    lines.join("\n")
}

/// A full-width line with an optional title, e.g. `──  Setup  ──`
pub fn render_rule(title: &str, character: char, align: Align, width: usize) -> String {
    const PADDING: usize = 2;

    if title.is_empty() {
        return character.to_string().repeat(width);
    }
    let title_len = char_len(title);
    if title_len + 2 * PADDING >= width {
        return center(title, width);
    }

    let fill = width - title_len - 2 * PADDING;
    let (left, right) = match align {
        Align::Left => (0, fill),
        Align::Right => (fill, 0),
        Align::Center => (fill / 2, fill - fill / 2),
    };
    let bar = |n: usize| character.to_string().repeat(n);
    let gap = " ".repeat(PADDING);
    format!("{}{}{}{}{}", bar(left), gap, title, gap, bar(right))
}

/// Which columns a progress line shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressLayout {
    /// Description, spinner and elapsed time
    #[default]
    Spinner,
    /// Bar, `done/total` count, percentage and time remaining
    TaskCounter,
    /// Bar, transferred bytes, percentage, speed and time remaining
    FileTransfer,
}

/// `H:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Decimal byte size, e.g. `1.5 MB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn spinner_frame(elapsed: Duration) -> char {
    SPINNER_FRAMES[(elapsed.as_millis() / 250) as usize % SPINNER_FRAMES.len()]
}

fn progress_bar(current: u64, total: u64) -> String {
    let filled = if total == 0 {
        PROGRESS_BAR_WIDTH
    } else {
        let current = current.min(total) as u128;
        let cells = (PROGRESS_BAR_WIDTH as u128 * current + total as u128 - 1) / total as u128;
        cells as usize
    };
    format!("[{}{}]", "█".repeat(filled), "░".repeat(PROGRESS_BAR_WIDTH - filled))
}

fn percent(current: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    (current.min(total) as u128 * 100 / total as u128) as u64
}

fn remaining(current: u64, total: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if current == 0 || secs <= 0.0 {
        return "-:--:--".to_string();
    }
    let rate = current as f64 / secs;
    let left = total.saturating_sub(current) as f64 / rate;
    format_duration(Duration::from_secs_f64(left))
}

/// One progress line, without any terminal control sequences
///
/// An unknown `total` draws a spinner instead of a bar in every layout.
pub fn render_progress(
    description: &str,
    layout: ProgressLayout,
    current: u64,
    total: Option<u64>,
    elapsed: Duration,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(6);
    if !description.is_empty() {
        parts.push(description.to_string());
    }

    match (layout, total) {
        (ProgressLayout::Spinner, _) | (_, None) => {
            parts.push(format!("[{}]", spinner_frame(elapsed)));
            if layout == ProgressLayout::FileTransfer {
                parts.push(format_bytes(current));
            } else if layout == ProgressLayout::TaskCounter {
                parts.push(current.to_string());
            }
            parts.push(format_duration(elapsed));
        }
        (ProgressLayout::TaskCounter, Some(total)) => {
            parts.push(progress_bar(current, total));
            parts.push(format!("{}/{}", current.min(total), total));
            parts.push(format!("{:>3}%", percent(current, total)));
            parts.push(format!("ETA {}", remaining(current, total, elapsed)));
        }
        (ProgressLayout::FileTransfer, Some(total)) => {
            let secs = elapsed.as_secs_f64();
            let speed = if secs > 0.0 { (current as f64 / secs) as u64 } else { 0 };
            parts.push(progress_bar(current, total));
            parts.push(format!("{}/{}", format_bytes(current.min(total)), format_bytes(total)));
            parts.push(format!("{:>3}%", percent(current, total)));
            parts.push(format!("{}/s", format_bytes(speed)));
            parts.push(format!("ETA {}", remaining(current, total, elapsed)));
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_panel_fits_content() {
        let panel = render_panel("done", Some("Status"), true);
        let lines: Vec<&str> = panel.lines().collect();
        assert_eq!(lines.len(), 5);
        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]));
        assert_eq!(widths[0], MIN_COMPACT_INNER_WIDTH + 2);
        assert!(lines[1].contains(" Status "));
        assert!(lines[3].starts_with("│ done"));
    }

    #[test]
    fn test_full_width_panel() {
        let panel = render_panel("a\nb", None, false);
        for line in panel.lines() {
            assert_eq!(line.chars().count(), DEFAULT_PANEL_WIDTH);
        }
        assert_eq!(panel.lines().count(), 4);
    }

    #[test]
    fn test_panel_truncates_long_lines() {
        let long = "x".repeat(200);
        let panel = render_panel(&long, None, false);
        assert!(panel.contains('…'));
        assert!(panel.lines().all(|l| l.chars().count() == DEFAULT_PANEL_WIDTH));
    }

    #[test]
    fn test_rule_alignment() {
        assert_eq!(render_rule("", '-', Align::Center, 5), "-----");
        assert_eq!(render_rule("ab", '-', Align::Center, 10), "--  ab  --");
        assert_eq!(render_rule("ab", '-', Align::Left, 10), "  ab  ----");
        assert_eq!(render_rule("ab", '-', Align::Right, 10), "----  ab  ");
    }

    #[test]
    fn test_rule_title_too_wide() {
        assert_eq!(render_rule("abcdef", '-', Align::Center, 8), " abcdef ");
    }

    #[test]
    fn test_task_counter_line() {
        let line = render_progress("Items", ProgressLayout::TaskCounter, 15, Some(50), Duration::from_secs(3));
        assert!(line.starts_with("Items ["));
        assert!(line.contains("15/50"));
        assert!(line.contains(" 30%"));
        // 35 left at 5 per second
        assert!(line.ends_with("ETA 0:00:07"));
        assert_eq!(line.matches('█').count(), 9);
        assert_eq!(line.matches('░').count(), PROGRESS_BAR_WIDTH - 9);
    }

    #[test]
    fn test_file_transfer_line() {
        let line = render_progress(
            "Downloading",
            ProgressLayout::FileTransfer,
            1_200_000,
            Some(1_500_000),
            Duration::from_secs(2),
        );
        assert!(line.contains("1.2 MB/1.5 MB"));
        assert!(line.contains(" 80%"));
        assert!(line.contains("600.0 kB/s"));
        assert!(line.ends_with("ETA 0:00:00"));
    }

    #[test]
    fn test_spinner_and_unknown_total() {
        let line = render_progress("Working", ProgressLayout::Spinner, 0, None, Duration::from_millis(3_300));
        assert_eq!(line, "Working [/] 0:00:03");

        let line = render_progress("Items", ProgressLayout::TaskCounter, 7, None, Duration::ZERO);
        assert_eq!(line, "Items [|] 7 0:00:00");
    }

    #[test]
    fn test_zero_total_is_complete() {
        let line = render_progress("", ProgressLayout::TaskCounter, 0, Some(0), Duration::ZERO);
        assert!(line.starts_with('['));
        assert_eq!(line.matches('█').count(), PROGRESS_BAR_WIDTH);
        assert!(line.contains("0/0 100%"));
        assert!(line.ends_with("ETA -:--:--"));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes(999), "999 bytes");
        assert_eq!(format_bytes(1_500), "1.5 kB");
        assert_eq!(format_bytes(2_000_000_000), "2.0 GB");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1:02:05");
    }
}
