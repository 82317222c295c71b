use chrono::NaiveDate;
use clap::Parser;
use fleet_assign::{
    Assignment, AssignmentController, AssignmentFilter, AssignmentState, Clock, NewAssignment,
    SqliteStore, SystemClock, TermsPatch, TransitionRequest, export_assignments_to_csv,
    load_catalog_from_json, load_import_records_from_json, telemetry,
};
use fleet_cost::{RetributionDefaults, RetributionMode};
use rust_decimal::Decimal;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

type CommandResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "fleet-cli", about = "Administrative console for the assignment ledger")]
struct Args {
    /// SQLite ledger file, created when missing.
    #[arg(long)]
    db: PathBuf,
    /// JSON catalog of projects and equipment to upsert before starting.
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    default_percentage: Option<Decimal>,
    #[arg(long)]
    default_fixed_rate: Option<Decimal>,
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.len() > widths[ci] {
                widths[ci] = cell.len();
            }
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&widths, headers.iter().copied()));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(&widths, row.iter().map(String::as_str)));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn render_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for (ci, cell) in cells.enumerate() {
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(widths[ci].saturating_sub(cell.len())));
        line.push_str(" |");
    }
    line
}

fn render_assignments(assignments: &[Assignment]) -> String {
    let headers = [
        "id",
        "equipment",
        "project",
        "cost_center",
        "state",
        "start",
        "terms",
        "est_hours",
        "act_hours",
        "total_cost",
    ];
    let rows: Vec<Vec<String>> = assignments
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                a.equipment_id.clone(),
                a.project_id.clone(),
                a.cost_center_id.clone(),
                a.state.to_string(),
                a.start_date.to_string(),
                a.retribution.to_string(),
                a.estimated_hours.to_string(),
                a.actual_hours.to_string(),
                a.total_cost.to_string(),
            ]
        })
        .collect();
    render_text_table(&headers, &rows)
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  list [state]                       List assignments, optionally by state\n  show <id>                          Show one assignment as JSON\n  create <equipment> <project> <cost_center> <YYYY-MM-DD> <hours> [mode value]\n                                     Create an active assignment\n  suspend <id>                       Suspend an active assignment\n  resume  <id>                       Reactivate a suspended assignment\n  cancel  <id>                       Cancel an open assignment\n  finalize <id> [YYYY-MM-DD]         Finalize (end date defaults to today)\n  hours <id> <actual>                Record actual hours and recompute cost\n  maintenance <id>                   Mark maintenance as validated\n  defaults <project>                 Show suggested terms for a project\n  import <json_path>                 Import historical records\n  export <csv_path>                  Export all assignments to CSV\n  purge <id>                         Delete a finalized or cancelled assignment\n  quit|exit                          Exit"
    );
}

fn parse_id(raw: Option<&str>, usage: &str) -> Result<Uuid, Box<dyn Error>> {
    let raw = raw.ok_or_else(|| format!("Usage: {usage}"))?;
    Uuid::parse_str(raw).map_err(|_| format!("Invalid id '{raw}'").into())
}

fn parse_date(raw: &str) -> Result<NaiveDate, Box<dyn Error>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{raw}' (YYYY-MM-DD)").into())
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal, Box<dyn Error>> {
    raw.parse::<Decimal>()
        .map_err(|_| format!("Invalid {what} '{raw}'").into())
}

struct Console {
    controller: AssignmentController,
    clock: SystemClock,
}

impl Console {
    fn list(&self, state: Option<&str>) -> CommandResult {
        let filter = match state {
            Some(state) => AssignmentFilter::by_state(state.parse::<AssignmentState>()?),
            None => AssignmentFilter::default(),
        };
        let assignments = self.controller.list(&filter)?;
        if assignments.is_empty() {
            println!("No assignments.");
        } else {
            print!("{}", render_assignments(&assignments));
        }
        Ok(())
    }

    fn show(&self, id: Uuid) -> CommandResult {
        let assignment = self.controller.get(id)?;
        println!("{}", serde_json::to_string_pretty(&assignment)?);
        Ok(())
    }

    fn create<'a>(&self, mut args: impl Iterator<Item = &'a str>) -> CommandResult {
        const USAGE: &str =
            "Usage: create <equipment> <project> <cost_center> <YYYY-MM-DD> <hours> [mode value]";
        let (Some(equipment), Some(project), Some(cost_center), Some(start), Some(hours)) = (
            args.next(),
            args.next(),
            args.next(),
            args.next(),
            args.next(),
        ) else {
            return Err(USAGE.into());
        };
        let retribution_mode = args
            .next()
            .map(str::parse::<RetributionMode>)
            .transpose()?;
        let retribution_value = args
            .next()
            .map(|raw| parse_decimal(raw, "retribution value"))
            .transpose()?;

        let input = NewAssignment {
            equipment_id: Some(equipment.to_string()),
            project_id: Some(project.to_string()),
            cost_center_id: Some(cost_center.to_string()),
            start_date: Some(parse_date(start)?),
            estimated_hours: Some(parse_decimal(hours, "hours")?),
            retribution_mode,
            retribution_value,
            created_by: Some("cli".to_string()),
            ..NewAssignment::default()
        };
        let created = self.controller.create(input, self.clock.now())?;
        println!(
            "Created assignment {} ({}, total cost {})",
            created.id, created.retribution, created.total_cost
        );
        Ok(())
    }

    fn transition(&self, id: Uuid, request: TransitionRequest) -> CommandResult {
        let updated = self.controller.transition(id, request, self.clock.now())?;
        match updated.actual_end_date {
            Some(end) => println!(
                "Assignment {} is now {} (ended {end})",
                updated.id, updated.state
            ),
            None => println!("Assignment {} is now {}", updated.id, updated.state),
        }
        Ok(())
    }

    fn patch(&self, id: Uuid, patch: TermsPatch) -> CommandResult {
        let updated = self.controller.update_terms(id, patch, self.clock.now())?;
        println!(
            "Assignment {} updated: billed hours {}, total cost {}",
            updated.id,
            updated.billing_hours(),
            updated.total_cost
        );
        Ok(())
    }

    fn defaults(&self, project_id: &str) -> CommandResult {
        let terms = self.controller.suggest_terms(project_id)?;
        println!("{} {}", terms.mode(), terms.value());
        Ok(())
    }

    fn import(&self, path: &str) -> CommandResult {
        let records = load_import_records_from_json(path)?;
        let total = records.len();
        let mut imported = 0;
        for (idx, record) in records.into_iter().enumerate() {
            match self.controller.import(record, self.clock.now()) {
                Ok(assignment) => {
                    imported += 1;
                    println!("Imported {} as {}", assignment.id, assignment.state);
                }
                Err(err) => println!("Record {idx} rejected: {err}"),
            }
        }
        println!("Imported {imported} of {total} records.");
        Ok(())
    }

    fn export(&self, path: &str) -> CommandResult {
        let assignments = self.controller.list(&AssignmentFilter::default())?;
        export_assignments_to_csv(&assignments, path)?;
        println!("Exported {} assignments to {path}.", assignments.len());
        Ok(())
    }

    fn purge(&self, id: Uuid) -> CommandResult {
        self.controller.purge(id)?;
        println!("Purged assignment {id}.");
        Ok(())
    }

    /// Runs one command line. Returns `false` when the session should end.
    fn execute(&self, input: &str) -> bool {
        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let result = match cmd {
            "help" => {
                print_help();
                Ok(())
            }
            "quit" | "exit" => return false,
            "list" => self.list(parts.next()),
            "show" => parse_id(parts.next(), "show <id>").and_then(|id| self.show(id)),
            "create" => self.create(parts),
            "suspend" => parse_id(parts.next(), "suspend <id>").and_then(|id| {
                self.transition(id, TransitionRequest::to(AssignmentState::Suspended))
            }),
            "resume" => parse_id(parts.next(), "resume <id>")
                .and_then(|id| self.transition(id, TransitionRequest::to(AssignmentState::Active))),
            "cancel" => parse_id(parts.next(), "cancel <id>").and_then(|id| {
                self.transition(id, TransitionRequest::to(AssignmentState::Cancelled))
            }),
            "finalize" => parse_id(parts.next(), "finalize <id> [YYYY-MM-DD]").and_then(|id| {
                let request = match parts.next() {
                    Some(raw) => TransitionRequest::finalize_on(parse_date(raw)?),
                    None => TransitionRequest::to(AssignmentState::Finalized),
                };
                self.transition(id, request)
            }),
            "hours" => parse_id(parts.next(), "hours <id> <actual>").and_then(|id| {
                let raw = parts.next().ok_or("Usage: hours <id> <actual>")?;
                let patch = TermsPatch {
                    actual_hours: Some(parse_decimal(raw, "hours")?),
                    ..TermsPatch::default()
                };
                self.patch(id, patch)
            }),
            "maintenance" => parse_id(parts.next(), "maintenance <id>").and_then(|id| {
                let patch = TermsPatch {
                    maintenance_validated: Some(true),
                    ..TermsPatch::default()
                };
                self.patch(id, patch)
            }),
            "defaults" => match parts.next() {
                Some(project) => self.defaults(project),
                None => Err("Usage: defaults <project>".into()),
            },
            "import" => match parts.next() {
                Some(path) => self.import(path),
                None => Err("Usage: import <json_path>".into()),
            },
            "export" => match parts.next() {
                Some(path) => self.export(path),
                None => Err("Usage: export <csv_path>".into()),
            },
            "purge" => parse_id(parts.next(), "purge <id>").and_then(|id| self.purge(id)),
            other => Err(format!("Unknown command '{other}'. Type 'help' for commands.").into()),
        };
        if let Err(err) = result {
            println!("Error: {err}");
        }
        true
    }
}

fn open_console(args: &Args) -> Result<Console, Box<dyn Error>> {
    let fallback = RetributionDefaults::default();
    let defaults = RetributionDefaults {
        percentage: args.default_percentage.unwrap_or(fallback.percentage),
        fixed_rate: args.default_fixed_rate.unwrap_or(fallback.fixed_rate),
    };
    defaults.validate()?;

    let store = Arc::new(SqliteStore::new(&args.db)?);
    if let Some(path) = &args.catalog {
        store.load_catalog(&load_catalog_from_json(path)?)?;
    }
    let controller =
        AssignmentController::new(store.clone(), store.clone(), store).with_defaults(defaults);
    Ok(Console {
        controller,
        clock: SystemClock,
    })
}

fn main() {
    telemetry::init_tracing(false, "warn");
    let args = Args::parse();
    let console = match open_console(&args) {
        Ok(console) => console,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    println!("Fleet assignments (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if !console.execute(input) {
            break;
        }
    }
}
