use std::io::{self, BufRead, Write};

use mezzo_match::config::Config;
use mezzo_match::display::{print_grid, print_prompt, print_summary, write_grid_to_file};
use mezzo_match::parser::{load_participants, load_unavailability};
use mezzo_match::store::MemoryStore;
use mezzo_match::{web, Engine};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Check if we should run in web mode
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "web" {
        let config = Config::from_env().with_port_arg(args.get(2));
        println!("Starting web server on {}:{}...", config.bind, config.port);
        println!("Session data in {}", config.data_dir.display());

        web::start_server(config).await?;
        return Ok(());
    }

    // CLI mode
    let Some(csv_path) = args.get(1) else {
        eprintln!("Usage: mezzo-match <participants.csv> [unavailability.csv]");
        eprintln!("       mezzo-match web [port]");
        return Err("missing participant table path".into());
    };

    println!("Loading participants from {}...", csv_path);
    let table = load_participants(csv_path)?;
    println!(
        "Loaded {} participants, {} preferences, {} meeting slots",
        table.participants.len(),
        table.requests.len(),
        table.slot_count
    );

    let engine = Engine::new(MemoryStore::new());
    let session_id = engine.load_session(&table)?;

    if let Some(blocks_path) = args.get(2) {
        for (entity, slots) in load_unavailability(blocks_path)? {
            if let Err(e) = engine.block_unavailability(&session_id, &entity, &slots) {
                println!("Skipping availability for {}: {}", entity, e);
            }
        }
    }

    println!("\n=== Running Matcher ===");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while let Some(prompt) = engine.next_tie_break_prompt(&session_id)? {
        print_grid(&engine.snapshot(&session_id)?.grid);
        loop {
            print_prompt(&prompt);
            print!("> ");
            io::stdout().flush()?;
            let answer = match lines.next() {
                Some(line) => line?,
                None => "keep".to_string(),
            };
            match engine.resolve_tie_break(&session_id, prompt.group, &answer) {
                Ok(_) => break,
                Err(e) if e.is_recoverable() => println!("{}", e),
                Err(e) => return Err(e.into()),
            }
        }
    }

    let state = engine.snapshot(&session_id)?;
    println!("\n=== Final Schedule ===");
    print_grid(&state.grid);
    print_summary(&engine.summary(&session_id)?);

    write_grid_to_file(&state.grid, "schedule.txt")?;
    println!("\nSchedule saved to schedule.txt");

    Ok(())
}
