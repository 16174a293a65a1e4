use std::error::Error;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use bio::io::fasta;
use serde::{Deserialize, Serialize};

use crate::helper::error::ServiceError;

/// On-disk layout of an alignment written by one of the aligners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentFormat {
    Clustal,
    Fasta,
}

impl AlignmentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AlignmentFormat::Clustal => "aln",
            AlignmentFormat::Fasta => "fasta",
        }
    }
}

impl Display for AlignmentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignmentFormat::Clustal => write!(f, "clustal"),
            AlignmentFormat::Fasta => write!(f, "fasta"),
        }
    }
}

/// Aligned sequences in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub format: AlignmentFormat,
    pub rows: Vec<(String, String)>,
}

impl Alignment {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map(|(_, seq)| seq.len()).unwrap_or(0)
    }

    fn validate(self) -> Result<Self, Box<dyn Error>> {
        if self.rows.is_empty() {
            return Err("alignment has no sequences".into());
        }
        let width = self.width();
        if width == 0 {
            return Err("alignment has empty sequences".into());
        }
        if let Some((id, seq)) = self.rows.iter().find(|(_, seq)| seq.len() != width) {
            return Err(format!(
                "sequence {} has length {}, expected {}",
                id,
                seq.len(),
                width
            )
            .into());
        }
        Ok(self)
    }
}

const CLUSTAL_HEADERS: [&str; 4] = ["CLUSTAL", "MUSCLE", "PROBCONS", "MAFFT"];

pub fn parse_clustal(text: &str) -> Result<Alignment, Box<dyn Error>> {
    let mut lines = text.lines().skip_while(|l| l.trim().is_empty());
    let header = lines.next().ok_or("empty file")?;
    if !CLUSTAL_HEADERS.iter().any(|h| header.starts_with(h)) {
        return Err(format!("not a Clustal header: {}", header).into());
    }

    let mut rows: Vec<(String, String)> = Vec::new();
    for line in lines {
        // blank separators and the conservation line start with whitespace
        if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(id), Some(block)) = (parts.next(), parts.next()) else {
            return Err(format!("malformed Clustal line: {}", line).into());
        };
        match rows.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, seq)) => seq.push_str(block),
            None => rows.push((id.to_string(), block.to_string())),
        }
    }

    Alignment {
        format: AlignmentFormat::Clustal,
        rows,
    }
    .validate()
}

pub fn parse_fasta(text: &str) -> Result<Alignment, Box<dyn Error>> {
    let reader = fasta::Reader::new(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let seq = String::from_utf8(record.seq().to_vec())?;
        rows.push((record.id().to_string(), seq));
    }
    Alignment {
        format: AlignmentFormat::Fasta,
        rows,
    }
    .validate()
}

/// Read an alignment, trying Clustal first and falling back to FASTA.
pub fn read_alignment(path: &Path) -> Result<Alignment, ServiceError> {
    let text = fs::read_to_string(path)?;
    parse_clustal(&text)
        .or_else(|_| parse_fasta(&text))
        .map_err(|_| ServiceError::UnreadableAlignment(path.to_path_buf()))
}

pub fn write_fasta(alignment: &Alignment, path: &Path) -> Result<(), ServiceError> {
    let mut writer = fasta::Writer::to_file(path)?;
    for (id, seq) in &alignment.rows {
        writer.write(id, None, seq.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Relaxed sequential PHYLIP, as accepted by RAxML.
pub fn write_phylip(alignment: &Alignment, path: &Path) -> Result<(), ServiceError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, " {} {}", alignment.len(), alignment.width())?;
    let pad = alignment
        .rows
        .iter()
        .map(|(id, _)| id.len())
        .max()
        .unwrap_or(0)
        + 1;
    for (id, seq) in &alignment.rows {
        writeln!(writer, "{:<pad$}{}", id, seq, pad = pad)?;
    }
    writer.flush()?;
    Ok(())
}
