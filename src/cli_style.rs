/*!
 * Terminal output helpers for the tessera CLI
 */

use crate::manager::ConnectionMetadata;
use crate::tier::{Tier, TierPolicy};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use tessera_core_resilience::{CircuitState, PoolStats};

/// Colors shared by every command
pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }

    pub fn header<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan().bold()
    }
}

pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const LOCK: &'static str = "🔒";
    pub const ARROW_RIGHT: &'static str = "→";
}

/// Section title followed by a rule
pub fn section_header(title: &str) {
    let line_len = 50 - title.len().min(40);
    println!(
        "\n{} {}",
        Theme::header(title),
        Theme::muted("─".repeat(line_len))
    );
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cells(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|title| {
            Cell::new(title)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold)
        })
        .collect()
}

/// Effective limits per tier
pub fn tier_table(policy: &TierPolicy) -> Table {
    let mut table = create_table();
    table.set_header(header_cells(&[
        "Tier",
        "Min",
        "Max",
        "Max Pending",
        "Breaker Threshold",
        "Reset Timeout",
    ]));

    for tier in Tier::ALL {
        let limits = policy.limits_for(tier);
        table.add_row(vec![
            Cell::new(tier).add_attribute(Attribute::Bold),
            Cell::new(limits.min_size),
            Cell::new(limits.max_size),
            Cell::new(limits.max_pending),
            Cell::new(limits.failure_threshold),
            Cell::new(format!("{:?}", limits.reset_timeout())).fg(Color::DarkGrey),
        ]);
    }

    table
}

/// One row per key: usage counters, pool occupancy and breaker state
pub fn usage_table(rows: &[(ConnectionMetadata, Option<PoolStats>, Option<CircuitState>)]) -> Table {
    let mut table = create_table();
    table.set_header(header_cells(&[
        "Tenant", "Backend", "Tier", "Queries", "Errors", "Pool", "Circuit",
    ]));

    for (meta, stats, circuit) in rows {
        let pool = stats.map_or_else(
            || "-".to_string(),
            |s| format!("{}/{} ({} idle)", s.size, s.max_size, s.available),
        );
        let circuit_cell = match circuit {
            Some(CircuitState::Closed) => Cell::new("closed").fg(Color::Green),
            Some(CircuitState::HalfOpen) => Cell::new("half-open").fg(Color::Yellow),
            Some(CircuitState::Open) => Cell::new("open").fg(Color::Red),
            None => Cell::new("-"),
        };
        let errors = if meta.error_count > 0 {
            Cell::new(meta.error_count).fg(Color::Red)
        } else {
            Cell::new(meta.error_count)
        };

        table.add_row(vec![
            Cell::new(&meta.tenant_id).add_attribute(Attribute::Bold),
            Cell::new(&meta.backend_type),
            Cell::new(meta.tier),
            Cell::new(meta.query_count),
            errors,
            Cell::new(pool),
            circuit_cell,
        ]);
    }

    table
}

pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "\n{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
}

pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}
