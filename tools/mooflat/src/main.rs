// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Command line front end for the textdump codec: load a dump, report what
//! it took to repair it, and write it back out in flat form, as JSON, or as
//! an object directory tree.

mod export;

use clap::Parser;
use eyre::WrapErr;
use mooflat_textdump::{EncodingMode, parse_bytes, serialize_bytes};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)] // requires `derive` feature
pub struct Args {
    #[clap(help = "Path of the textdump database to load")]
    dbfile: PathBuf,

    #[clap(
        long,
        help = "If set, write the loaded database back out as a normalized flat textdump at this path."
    )]
    out_textdump: Option<PathBuf>,

    #[clap(
        long,
        help = "If set, write the loaded database as a single JSON document at this path."
    )]
    out_json: Option<PathBuf>,

    #[clap(
        long,
        help = "If set, write one directory per object at this path, each with info.json, props.json and one .moo file per programmed verb."
    )]
    out_dir: Option<PathBuf>,

    #[clap(
        long,
        help = "In --out-dir output, replace object numbers with $name references taken from #0's properties."
    )]
    corrify: bool,

    #[clap(
        long,
        default_value = "ISO-8859-1",
        help = "String encoding for --out-textdump output (ISO-8859-1 or UTF-8)."
    )]
    encoding: EncodingMode,

    #[clap(long, help = "Enable debug logging")]
    debug: bool,
}

fn main() -> Result<(), eyre::Report> {
    color_eyre::install()?;
    let args: Args = Args::parse();

    let main_subscriber = tracing_subscriber::fmt()
        .compact()
        .with_ansi(true)
        .with_span_events(FmtSpan::NONE)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(main_subscriber).unwrap_or_else(|e| {
        eprintln!("Unable to configure logging: {e}");
        std::process::exit(1);
    });

    let bytes = fs::read(&args.dbfile)
        .wrap_err_with(|| format!("reading {}", args.dbfile.display()))?;
    let parsed = parse_bytes(&bytes)
        .wrap_err_with(|| format!("parsing {}", args.dbfile.display()))?;
    for warning in &parsed.warnings {
        warn!("{warning}");
    }
    let db = parsed.db;
    info!(
        "loaded {}: format version {}, {} objects ({} recycled), {} programs, {} users, {} queued / {} suspended tasks",
        args.dbfile.display(),
        db.version as u16,
        db.objects.len(),
        db.recycled.len(),
        db.total_programs(),
        db.players.len(),
        db.queued_tasks.len(),
        db.suspended_tasks.len()
    );

    if let Some(out) = &args.out_textdump {
        let flat = serialize_bytes(&db, args.encoding)?;
        fs::write(out, flat).wrap_err_with(|| format!("writing {}", out.display()))?;
        info!("wrote flat textdump to {}", out.display());
    }

    if let Some(out) = &args.out_json {
        let json = serde_json::to_string_pretty(&db)?;
        fs::write(out, json).wrap_err_with(|| format!("writing {}", out.display()))?;
        info!("wrote JSON to {}", out.display());
    }

    if let Some(out) = &args.out_dir {
        export::to_moo_files(&db, out, args.corrify)
            .wrap_err_with(|| format!("writing object tree to {}", out.display()))?;
        info!("wrote object tree to {}", out.display());
    }

    Ok(())
}
