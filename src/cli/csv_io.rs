//! CSV input and output for batch geocoding.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::warn;

use locus::models::{Address, AddressCandidate, AddressPart};

/// Read addresses from CSV whose headers are address part names
/// (`address_line`, `locality1`, `full_address`, ...).
///
/// Columns with unknown headers are ignored.
pub fn read_addresses<R: Read>(reader: R) -> Result<Vec<Address>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let columns: Vec<Option<AddressPart>> = headers.iter().map(AddressPart::from_name).collect();
    for (header, part) in headers.iter().zip(&columns) {
        if part.is_none() {
            warn!("Ignoring CSV column '{}'", header);
        }
    }
    if columns.iter().all(Option::is_none) {
        anyhow::bail!("CSV has no address part columns");
    }

    let mut addresses = Vec::new();
    for (line, result) in csv_reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV record {}", line + 1))?;
        let mut address = Address::new();
        for (value, part) in record.iter().zip(&columns) {
            if let Some(part) = part {
                address.set(*part, value.trim());
            }
        }
        addresses.push(address);
    }
    Ok(addresses)
}

/// Write one row per input address; unmatched rows keep only their index.
pub fn write_results<W: Write>(writer: W, results: &[Option<AddressCandidate>]) -> Result<()> {
    let mut csv_writer = WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(["index", "score", "x", "y", "match_address", "locator", "address_type"])?;

    for (index, result) in results.iter().enumerate() {
        let row = match result {
            Some(candidate) => {
                let (x, y) = candidate
                    .location
                    .map(|p| (p.x().to_string(), p.y().to_string()))
                    .unwrap_or_default();
                [
                    index.to_string(),
                    candidate.score.to_string(),
                    x,
                    y,
                    candidate.full_address().to_string(),
                    candidate.address.match_method.clone(),
                    candidate.address_type.clone(),
                ]
            }
            None => [
                index.to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        };
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
