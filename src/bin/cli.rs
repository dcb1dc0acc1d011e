#![cfg(not(tarpaulin_include))]

use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use tagplan::access::{AccessPolicy, Actor};
use tagplan::metrics;
use tagplan::sheet::SheetKind;
use tagplan::store::DataDir;
use tagplan::table::TableState;
use tagplan::{RowId, Workspace};

const PAGE: usize = 10;
const CELL_WIDTH: usize = 18;

/// Interactive shell over one sheet of the tagging plan.
#[derive(Parser, Debug)]
#[command(name = "tagplan-cli")]
struct Args {
    #[arg(long, env = "TAGPLAN_DATA_DIR", default_value = "public/data")]
    data_dir: PathBuf,

    /// Sheet to open: "Tagging Plan", "Legacy Tagging Plan" or "Data ref".
    #[arg(long, default_value = "Tagging Plan")]
    sheet: SheetKind,

    #[arg(long, env = "TAGPLAN_ADMIN_EMAIL")]
    admin_email: Option<String>,

    /// Identity to act as; edits need the administrator's email.
    #[arg(long = "as", env = "TAGPLAN_USER")]
    user: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let actor = AccessPolicy::new(args.admin_email).resolve(args.user.as_deref());
    let mut workspace = Workspace::open(DataDir::new(&args.data_dir), args.sheet);

    let mut start_time = Instant::now();
    let mut status = String::from("ok");
    let mut search = String::new();
    let mut offset = 0;
    let mut show = true;

    loop {
        if show {
            display(workspace.table(), &search, offset);
        }

        let elapsed_time = start_time.elapsed().as_secs_f64();
        print!("[{:.1}] ({}) > ", elapsed_time, status);
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let command = line.trim();
        start_time = Instant::now();

        if command.is_empty() {
            status = String::from("invalid command");
            continue;
        }
        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
        let rest = rest.trim();

        status = match verb {
            "q" => break,
            "help" => {
                print_help();
                String::from("ok")
            }
            "w" => {
                offset = offset.saturating_sub(PAGE);
                String::from("ok")
            }
            "s" => {
                let visible = workspace.table().filter(&search).rows.len();
                if offset + PAGE < visible {
                    offset += PAGE;
                }
                String::from("ok")
            }
            "disable_output" => {
                show = false;
                String::from("ok")
            }
            "enable_output" => {
                show = true;
                String::from("ok")
            }
            "find" => {
                search = rest.to_string();
                offset = 0;
                String::from("ok")
            }
            "open" => match rest.parse::<SheetKind>() {
                Ok(kind) => {
                    workspace = Workspace::open(workspace.data_dir().clone(), kind);
                    offset = 0;
                    String::from("ok")
                }
                Err(e) => e,
            },
            "reload" => {
                workspace.reload();
                String::from("ok")
            }
            "toggle" => match workspace.table_mut().toggle_category(rest) {
                Some(true) => String::from("expanded"),
                Some(false) => String::from("collapsed"),
                None => String::from("no such category"),
            },
            "groups" => {
                for group in workspace.table().filter(&search).groups {
                    let marker = if group.expanded { "-" } else { "+" };
                    println!("{} {} ({})", marker, group.category, group.row_count);
                }
                String::from("ok")
            }
            "metrics" => {
                let m = metrics::compute(workspace.table().rows());
                println!(
                    "rows: {}  events: {}  categories: {}  custom: {} ({}%)",
                    m.total_rows, m.unique_events, m.unique_categories, m.custom_events, m.completion_rate
                );
                String::from("ok")
            }
            "add_row" => result(workspace.table_mut().add_row(&actor).map(|id| id.to_string())),
            "del_row" => result(
                workspace
                    .delete_row(&actor, &RowId::new(rest))
                    .map(|sync| format!("{:?}", sync)),
            ),
            "add_col" => result(workspace.table_mut().add_column(&actor)),
            "del_col" => {
                let confirmed = confirm(&format!(
                    "Delete column \"{}\" and all its values? This cannot be undone (y/N) ",
                    rest
                ))?;
                result(
                    workspace
                        .table_mut()
                        .delete_column(&actor, rest, confirmed)
                        .map(|_| String::from("ok")),
                )
            }
            "rename" => match rest.split_once(" to ") {
                Some((old, new)) => result(
                    workspace
                        .table_mut()
                        .rename_column(&actor, old.trim(), new)
                        .map(|_| String::from("ok")),
                ),
                None => String::from("usage: rename <old> to <new>"),
            },
            "move" => match rest.split_once(" before ") {
                Some((dragged, target)) => result(
                    workspace
                        .table_mut()
                        .reorder_columns(&actor, dragged.trim(), target.trim())
                        .map(|moved| String::from(if moved { "ok" } else { "unchanged" })),
                ),
                None => String::from("usage: move <column> before <column>"),
            },
            "move_row" => match rest.split_once(" before ") {
                Some((dragged, target)) => result(
                    workspace
                        .table_mut()
                        .move_row(&actor, &RowId::new(dragged.trim()), &RowId::new(target.trim()))
                        .map(|moved| String::from(if moved { "ok" } else { "unchanged" })),
                ),
                None => String::from("usage: move_row <id> before <id>"),
            },
            "save" => result(workspace.save(&actor).map(|report| format!("{:?}", report))),
            "export" => {
                let path = if rest.is_empty() { "tagging_plan_export.xlsx" } else { rest };
                match workspace.export() {
                    Ok(bytes) => result(std::fs::write(path, bytes).map(|_| path.to_string())),
                    Err(e) => e.to_string(),
                }
            }
            _ => edit(&mut workspace, &actor, command),
        };
    }

    Ok(())
}

// <row id>.<column>=<value>
fn edit(workspace: &mut Workspace, actor: &Actor, command: &str) -> String {
    let Some((target, value)) = command.split_once('=') else {
        return String::from("invalid command");
    };
    let Some((id, column)) = target.split_once('.') else {
        return String::from("invalid command");
    };
    result(
        workspace
            .table_mut()
            .edit(actor, &RowId::new(id.trim()), column.trim(), value)
            .map(|_| String::from("ok")),
    )
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn result<E: std::fmt::Display>(outcome: Result<String, E>) -> String {
    match outcome {
        Ok(message) => message,
        Err(e) => e.to_string(),
    }
}

fn display(table: &TableState, search: &str, offset: usize) {
    let view = table.filter(search);
    let columns: Vec<&str> = view
        .columns
        .iter()
        .map(|c| c.name)
        .filter(|name| *name != tagplan::sheet::PHOTO_COLUMN)
        .collect();

    print!("{:<10}", "_id");
    for column in &columns {
        print!("{:<width$}", clip(column), width = CELL_WIDTH);
    }
    println!();

    for row in view.rows.iter().skip(offset).take(PAGE) {
        print!("{:<10}", clip(row.id.as_str()));
        for column in &columns {
            print!("{:<width$}", clip(row.get(column)), width = CELL_WIDTH);
        }
        println!();
    }
    println!(
        "{} - {} of {} rows in {}",
        offset.min(view.rows.len()),
        (offset + PAGE).min(view.rows.len()),
        view.rows.len(),
        table.kind()
    );
}

fn clip(text: &str) -> String {
    text.chars().take(CELL_WIDTH - 2).collect()
}

fn print_help() {
    println!("Commands:");
    println!("  q: Quit");
    println!("  w / s: Previous / next page");
    println!("  find <text>: Filter rows (empty to clear)");
    println!("  open <sheet>: Switch sheet");
    println!("  groups: List categories");
    println!("  toggle <category>: Expand or collapse a category");
    println!("  metrics: Show summary metrics");
    println!("  <id>.<column>=<value>: Edit a cell");
    println!("  add_row, del_row <id>, add_col, del_col <column>");
    println!("  rename <old> to <new>, move <column> before <column>");
    println!("  move_row <id> before <id>");
    println!("  save, reload, export [path]");
    println!("  disable_output / enable_output");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_an_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }
}
