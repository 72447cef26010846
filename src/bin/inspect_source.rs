use assetimport::source::{RowSource, SourceOptions};
use std::{env, error::Error, path::Path, process::exit};

fn main() {
    // Expect a path and an optional row count.
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <CSV_OR_XLSX_FILE> [ROWS]", args[0]);
        exit(1);
    }
    let limit = match args.get(2).map(|n| n.parse::<usize>()) {
        None => 5,
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            eprintln!("Error: invalid row count {:?}: {}", args[2], e);
            exit(1);
        }
    };
    if let Err(e) = inspect_source(Path::new(&args[1]), limit) {
        eprintln!("Error: {}", e);
        let mut cause = e.source();
        while let Some(c) = cause {
            eprintln!("  caused by: {}", c);
            cause = c.source();
        }
        exit(1);
    }
}

/// Print the header columns and the first `limit` rows as JSON.
fn inspect_source(path: &Path, limit: usize) -> Result<(), Box<dyn Error>> {
    let source = RowSource::open(path, SourceOptions::default())?;
    let mut rows = source.rows()?.peekable();

    println!(
        "=== Source: {} ({:?}) ===",
        source.path().display(),
        source.format()
    );

    // 1) Header, taken from the first data row
    if let Some(Ok(first)) = rows.peek() {
        println!("=== Columns ===");
        for name in first.column_names() {
            println!("- {}", name);
        }
        println!();
    }

    // 2) Sample rows
    println!("=== First {} rows ===", limit);
    let mut total = 0usize;
    for row in rows {
        let row = row?;
        if total < limit {
            println!(
                "line {:>5}: {}",
                row.line(),
                serde_json::to_string(&row.to_json())?
            );
        }
        total += 1;
    }
    println!();
    println!("Total data rows: {}", total);
    Ok(())
}
