use colored::Colorize;

pub mod builder;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod conflicts;
pub mod evaluator;
pub mod fs_utils;
pub mod logging;
pub mod phase;
pub mod process;
pub mod report;
pub mod runner;
pub mod submission;

pub fn run(cli: config::Cli) -> anyhow::Result<()> {
    logging::init_tracing(cli.debug);
    match cli.color.as_deref() {
        Some("on") => colored::control::set_override(true),
        Some("off") => colored::control::set_override(false),
        _ => {}
    }

    let settings = config::Settings::from(&cli);
    if settings.summary {
        println!("[INFO]: Evaluating {}", settings.assignment);
    }

    let table = runner::grade_all(&settings)?;

    if settings.write_csv {
        let path = settings.layout.result_csv(&settings.assignment);
        table.save_csv(&path)?;
        if settings.summary {
            println!("[INFO]: Results written to {}", path.display());
        }
    }

    if settings.summary {
        for row in table.rows() {
            let line = format!("{}: {}/{}", row.group, row.total, row.width());
            if row.total as usize == row.width() && row.width() > 0 {
                println!("{}", line.green());
            } else if row.total == 0 {
                println!("{}", line.red());
            } else {
                println!("{line}");
            }
        }
    }

    if settings.print_json {
        println!("{}", serde_json::to_string(&table)?);
    }

    Ok(())
}
