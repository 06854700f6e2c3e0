use anyhow::{Result, bail};
use clap::Parser;
use log::LevelFilter;
use std::io::Write;
use update_stamp::{
    arguments::Arguments,
    stamper::{StampOptions, stamp_all},
};

fn main() -> Result<()> {
    let args = Arguments::parse();
    pretty_env_logger::env_logger::builder()
        .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .format_timestamp(None)
        .init();

    let options = StampOptions {
        strategy: args.strategy,
        reset_build: args.reset_build,
        recursive: !args.no_recurse,
        fail_fast: args.fail_fast,
        dry_run: args.dry_run,
    };

    // Records are flushed one by one so progress shows up before a later failure
    let mut stdout = std::io::stdout().lock();
    let summary = stamp_all(&args.folder, &options, |record| {
        writeln!(stdout, "{}", record.render(args.format)?)?;
        stdout.flush()?;
        Ok(())
    })?;

    if summary.failed > 0 {
        bail!("{} project file(s) could not be stamped", summary.failed);
    }

    Ok(())
}
