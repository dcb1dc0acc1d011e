use chrono::NaiveDate;
use rand::Rng;

use crate::model::{Group, Row, RowId, SheetData};

/// Rows generated when a sheet has no data yet.
pub const PLACEHOLDER_ROWS: usize = 150;

/// Group holding the generated rows.
pub const PLACEHOLDER_CATEGORY: &str = "Mock Data";

const KIND: &str = "custom|standard";
const ACTION: &str = "event_action";
const CATEGORY: &str = "event_category";
const INTERACTION: &str = "interaction or <recommanded event>";
const ZONE: &str = "zone/ origine";
const CREATED: &str = "Creation date";

const ACTIONS: [&str; 5] = ["click", "view", "submit", "scroll", "hover"];
const CATEGORIES: [&str; 5] = ["Navigation", "Product", "Checkout", "User Account", "Search"];
const INTERACTIONS: [&str; 4] = ["ui_interaction", "page_view", "form_submission", "system_event"];
const ZONES: [&str; 5] = ["Header", "Footer", "Product Page", "Cart", "Menu"];

/// Build a synthetic tagging plan so a freshly installed dashboard is never empty.
pub fn generate() -> SheetData {
    let mut rng = rand::thread_rng();
    let mut group = Group::new(PLACEHOLDER_CATEGORY);

    for _ in 0..PLACEHOLDER_ROWS {
        let kind = if rng.gen_bool(0.7) { "standard" } else { "custom" };
        let created = NaiveDate::from_ymd_opt(2025, rng.gen_range(1..=12), rng.gen_range(1..=28))
            .map(|date| date.format("%-m/%-d/%Y").to_string())
            .unwrap_or_default();

        let row = Row::new(RowId::fresh())
            .with_field(KIND, kind)
            .with_field(ACTION, pick(&mut rng, &ACTIONS))
            .with_field(CATEGORY, pick(&mut rng, &CATEGORIES))
            .with_field(INTERACTION, pick(&mut rng, &INTERACTIONS))
            .with_field(ZONE, pick(&mut rng, &ZONES))
            .with_field(CREATED, &created);
        group.rows.push(row);
    }

    SheetData {
        headers: [KIND, ACTION, CATEGORY, INTERACTION, ZONE, CREATED]
            .iter()
            .map(|header| header.to_string())
            .collect(),
        tooltips: Vec::new(),
        groups: vec![group],
    }
}

fn pick<'a>(rng: &mut impl Rng, choices: &[&'a str]) -> &'a str {
    choices[rng.gen_range(0..choices.len())]
}
