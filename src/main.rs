mod cli;

use std::io::{BufReader, Read as _};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;

use cli::{Cli, Command, MatchArgs};
use lineage::config::Config;
use lineage::extract::extract_sub_instructions;
use lineage::hierarchy::TieBreak;
use lineage::matcher::MatchConfig;
use lineage::output::TaskDetail;
use lineage::{db, ops, output, paths};

fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn open_db(db_path: &str) -> Result<Connection> {
    ensure_db_dir(db_path)?;
    let conn = db::open(db_path)?;
    db::init(&conn)?;
    Ok(conn)
}

fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from(Path::new(&p)),
        None => Config::load(),
    }
}

fn match_config(config: &Config, args: &MatchArgs) -> Result<MatchConfig> {
    let mut m = config.match_config();
    if let Some(n) = args.max_length {
        m.max_length = n;
    }
    if let Some(n) = args.min_prefix {
        m.min_prefix_length = n;
    }
    if args.fallback {
        m.full_text_fallback = true;
    }
    if args.no_fallback {
        m.full_text_fallback = false;
    }
    m.validate().context("invalid --max-length")?;
    Ok(m)
}

fn read_input(file: Option<&str>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {path}")),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("LINEAGE_LOG", "warn"))
        .format_timestamp_secs()
        .init();
}

fn main() {
    setup_logging();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(paths::db_path);
    let config = load_config(cli.config)?;

    match cli.command {
        Command::Import { file } => {
            let conn = open_db(&db_path)?;
            let tasks = match file.as_deref() {
                Some(path) => {
                    let f = std::fs::File::open(path)
                        .with_context(|| format!("failed to open {path}"))?;
                    ops::parse_jsonl(BufReader::new(f))?
                }
                None => ops::parse_jsonl(std::io::stdin().lock())?,
            };
            let n = ops::import_tasks(&conn, &tasks)?;
            eprintln!("Imported {n} task(s)");
        }

        Command::Rebuild {
            matching,
            tie_break,
            json,
        } => {
            let conn = open_db(&db_path)?;
            let m = match_config(&config, &matching)?;
            let policy = match tie_break {
                Some(s) => TieBreak::parse(&s)?,
                None => config.tie_break(),
            };
            let result = ops::rebuild(&conn, &m, policy)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", output::format_summary(&result));
            }
        }

        Command::Candidates { id, matching, json } => {
            let conn = open_db(&db_path)?;
            let m = match_config(&config, &matching)?;
            let candidates = ops::candidates_for(&conn, &id, &m)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else if candidates.is_empty() {
                eprintln!("No candidate parents for '{id}'");
            } else {
                print!("{}", output::format_candidates(&candidates));
            }
        }

        Command::Extract { file } => {
            let text = read_input(file.as_deref())?;
            for literal in extract_sub_instructions(&text) {
                println!("{}", serde_json::to_string(&literal)?);
            }
        }

        Command::Tree { root, json } => {
            let conn = open_db(&db_path)?;
            if let Some(r) = root.as_deref() {
                ops::get_task(&conn, r)?;
            }
            let links = ops::list_links(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&links)?);
            } else {
                let tasks = ops::load_tasks(&conn)?;
                print!("{}", output::format_task_tree(&tasks, &links, root.as_deref()));
            }
        }

        Command::Show { id, json } => {
            let conn = open_db(&db_path)?;
            let task = ops::get_task(&conn, &id)?;
            let parent = ops::parent_of(&conn, &id)?;
            let children = ops::children_of(&conn, &id)?;
            if json {
                let detail = TaskDetail {
                    task: &task,
                    parent: parent.as_ref(),
                    children: &children,
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!(
                    "{}",
                    output::format_task_detail(&task, parent.as_ref(), &children)
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_apply() {
        let args = MatchArgs {
            max_length: Some(64),
            min_prefix: Some(16),
            fallback: true,
            ..MatchArgs::default()
        };
        let m = match_config(&Config::default(), &args).unwrap();
        assert_eq!(m.max_length, 64);
        assert_eq!(m.min_prefix_length, 16);
        assert!(m.full_text_fallback);
    }

    #[test]
    fn zero_max_length_override_is_rejected() {
        let args = MatchArgs {
            max_length: Some(0),
            ..MatchArgs::default()
        };
        let err = match_config(&Config::default(), &args).unwrap_err();
        assert!(format!("{err:#}").contains("max_length must be greater than zero"));
    }
}
