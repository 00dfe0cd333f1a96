//! CSV rendering as an aligned text table.

use csv::ReaderBuilder;

/// Parse CSV with a header row and render it as a right-aligned table,
/// one line per record, columns separated by a space.
pub(super) fn read_csv(bytes: &[u8]) -> Result<String, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("failed to read CSV headers: {}", e))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = vec![headers];
    for record in reader.records() {
        let record = record.map_err(|e| format!("failed to read CSV record: {}", e))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(render_table(&rows))
}

fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; columns];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, width)| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                format!("{:>width$}", cell, width = *width)
            })
            .collect();
        lines.push(cells.join(" "));
    }
    lines.join("\n")
}
