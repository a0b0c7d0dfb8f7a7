use std::{path::PathBuf, sync::Arc, thread, time::Instant};

use anyhow::{Context, Result, anyhow};
use chrono::{Days, Local, NaiveDate};
use clap::Parser;
use colored::Colorize;
use lending_ledger::{
    CatalogEntry, CatalogId, LedgerConfig, LedgerError, LendingLedger, LibraryDirectory, LibraryId,
    Member, MemberId, OverdueNotifier, TransitionLogger,
};
use rand::Rng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the lending ledger demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log every transition, including denied ones
    #[arg(short, long)]
    verbose: bool,

    /// Print the final inventory as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Run a concurrent borrow storm after the demo
    #[arg(short, long)]
    stress_test: bool,

    /// Worker threads for the stress test
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Borrow/return attempts per worker in the stress test
    #[arg(long, default_value_t = 500)]
    rounds: u32,

    /// JSON file with ledger settings
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "lending_ledger=debug"
    } else {
        "lending_ledger=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LedgerConfig::default(),
    };

    println!("{}", "Lending Ledger Demonstration".green().bold());
    println!("=====================================\n");

    let today = Local::now().date_naive();
    let directory = demo(config.clone(), today)?;

    if args.stress_test {
        stress_test(config, args.threads, args.rounds)?;
    }

    let central = directory.library(&LibraryId::new("Central Library"))?;
    let snapshot = central.snapshot();
    if args.json {
        println!("{}", snapshot.to_json()?);
    } else {
        println!("\n{snapshot}");
    }

    println!("{}", "Demonstration complete!".green().bold());
    Ok(())
}

/// Walk through the everyday desk operations on a single library
fn demo(config: LedgerConfig, today: NaiveDate) -> Result<LibraryDirectory> {
    let mut directory = LibraryDirectory::new();

    let central = LendingLedger::new("Central Library", config)
        .with_observer(TransitionLogger)
        .with_observer(OverdueNotifier);

    let effective_java = CatalogEntry::new(
        "978-0134685991",
        "Effective Java",
        "Joshua Bloch",
        ["Programming", "Java"],
    );
    let design_patterns = CatalogEntry::new(
        "978-0201616224",
        "Design Patterns",
        "Gang of Four",
        ["Programming", "Design"],
    );
    let clean_code = CatalogEntry::new(
        "978-0132350884",
        "Clean Code",
        "Robert Martin",
        ["Programming", "Best Practices"],
    );
    central.register(effective_java, 3)?;
    central.register(design_patterns, 2)?;
    central.register(clean_code, 1)?;

    let library = directory.add_library(central)?;
    directory.add_member(Member::student("S001", "Alice Johnson", "alice@email.com"))?;
    directory.add_member(Member::faculty("F001", "Dr. Bob Smith", "bob@university.edu"))?;

    let library_id = library.library_id().clone();
    let student = MemberId::new("S001");
    let faculty = MemberId::new("F001");
    let java = CatalogId::new("978-0134685991");
    let patterns = CatalogId::new("978-0201616224");
    let clean = CatalogId::new("978-0132350884");

    println!("{}", "Searching for 'Java' books:".yellow().bold());
    for entry in directory.search(&library_id, "Java")? {
        println!("- {}", entry.title());
    }

    println!("\n{}", "Borrowing books:".yellow().bold());
    let borrowed = directory.borrow(&library_id, &student, &java, today);
    println!("Student borrowed Effective Java: {}", describe(&borrowed.map(|_| ())));
    let borrowed = directory.borrow(&library_id, &faculty, &patterns, today);
    println!("Faculty borrowed Design Patterns: {}", describe(&borrowed.map(|_| ())));

    println!("\n{}", "Checking availability:".yellow().bold());
    println!("Effective Java available: {}", library.is_available(&java));
    println!("Clean Code available: {}", library.is_available(&clean));

    println!("\n{}", "Returning books:".yellow().bold());
    let returned = directory.return_copy(&library_id, &student, &java, today);
    println!("Student returned Effective Java: {}", describe(&returned.map(|_| ())));

    let late = today.checked_add_days(Days::new(40)).unwrap_or(today);
    let returned = directory.return_copy(&library_id, &faculty, &patterns, late);
    match returned {
        Ok(receipt) => println!(
            "Faculty returned Design Patterns on {late}: fine {}",
            format!("${}", receipt.fine).red().bold()
        ),
        Err(error) => println!("Faculty return failed: {error}"),
    }

    println!("\n{}", "Denied requests:".yellow().bold());
    let denied = directory.return_copy(&library_id, &student, &clean, today);
    println!(
        "Student returning a book never borrowed: {}",
        describe(&denied.map(|_| ()))
    );
    let denied = directory.borrow(&library_id, &faculty, &CatalogId::new("invalid-isbn"), today);
    println!("Faculty borrowing an unknown title: {}", describe(&denied.map(|_| ())));

    let borrowed = directory.borrow(&library_id, &faculty, &clean, today);
    println!("\nFaculty borrowed Clean Code: {}", describe(&borrowed.map(|_| ())));
    println!("\n{}", "Faculty's borrowed books:".yellow().bold());
    directory.with_member(&faculty, |member| {
        for record in member.active_records() {
            let title = library
                .entries()
                .into_iter()
                .find(|entry| entry.id() == record.catalog_id())
                .map_or_else(
                    || record.catalog_id().to_string(),
                    |entry| entry.title().to_string(),
                );
            println!("- {title} (Due: {})", record.due_date());
        }
    })?;

    Ok(directory)
}

/// One-word outcome of a desk operation
fn describe(outcome: &Result<(), LedgerError>) -> String {
    match outcome {
        Ok(()) => "granted".green().to_string(),
        Err(error) if error.is_business_outcome() => format!("{} ({error})", "denied".yellow()),
        Err(error) => format!("{} ({error})", "rejected".red()),
    }
}

/// Hammer one ledger from many threads and check that no copy was lost or duplicated
fn stress_test(config: LedgerConfig, threads: usize, rounds: u32) -> Result<()> {
    println!(
        "\n{}",
        "Running stress test with concurrent borrowers...".yellow().bold()
    );

    let ledger = Arc::new(LendingLedger::new(
        "Stress Branch",
        config.with_log_denials(false),
    ));
    let titles: Vec<CatalogId> = (1..=4u32)
        .map(|n| {
            let entry =
                CatalogEntry::new(format!("stress-{n}"), format!("Title {n}"), "Anon", ["Load"]);
            let id = entry.id().clone();
            ledger.register(entry, n).map(|()| id)
        })
        .collect::<Result<_, _>>()?;

    println!("Spawning {threads} threads with {rounds} operations each");
    let start_time = Instant::now();
    let day_zero = Local::now().date_naive();

    let handles: Vec<_> = (0..threads)
        .map(|worker| {
            let ledger = Arc::clone(&ledger);
            let titles = titles.clone();
            thread::spawn(move || {
                let mut rng = rand::rng();
                let mut member = Member::faculty(
                    format!("W{worker:03}"),
                    format!("Worker {worker}"),
                    "worker@load.test",
                );
                let (mut granted, mut denied) = (0u64, 0u64);

                for round in 0..rounds {
                    let Some(title) = titles.get(rng.random_range(0..titles.len())) else {
                        continue;
                    };
                    let today = day_zero
                        .checked_add_days(Days::new(u64::from(round)))
                        .unwrap_or(day_zero);

                    // 60% chance to borrow, 40% chance to return
                    let outcome = if rng.random::<f32>() < 0.6 {
                        ledger.borrow(title, &mut member, today).map(|_| ())
                    } else {
                        ledger.return_copy(title, &mut member, today).map(|_| ())
                    };
                    if outcome.is_ok() {
                        granted = granted.saturating_add(1);
                    } else {
                        denied = denied.saturating_add(1);
                    }
                }

                (member, granted, denied)
            })
        })
        .collect();

    let mut total_granted = 0u64;
    let mut total_denied = 0u64;
    let mut members = Vec::with_capacity(threads);
    for handle in handles {
        let (member, granted, denied) =
            handle.join().map_err(|_| anyhow!("stress worker panicked"))?;
        total_granted = total_granted.saturating_add(granted);
        total_denied = total_denied.saturating_add(denied);
        members.push(member);
    }

    ledger.verify_invariants()?;
    for title in &titles {
        let stock = ledger.stock(title).unwrap_or_default();
        let held = members
            .iter()
            .filter(|member| member.active_record(ledger.library_id(), title).is_some())
            .count();
        if held != stock.on_loan {
            return Err(anyhow!(
                "{title}: members hold {held} copies but the ledger lends {}",
                stock.on_loan
            ));
        }
        println!(
            "{title}: {}/{} available, {} on loan",
            stock.available, stock.total, stock.on_loan
        );
    }

    println!(
        "{} {total_granted} granted, {total_denied} denied in {:?}",
        "Invariants hold:".green().bold(),
        start_time.elapsed()
    );
    Ok(())
}
