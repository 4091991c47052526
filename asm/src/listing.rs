use b33arch::LabelTable;
use color_print::cformat;

use crate::{analyzer::AnalyzedLine, assembler::ListingLine};

const BYTES_SHOWN: usize = 3;

fn hex_bytes(bytes: &[u8]) -> String {
    let mut s = bytes
        .iter()
        .take(BYTES_SHOWN)
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > BYTES_SHOWN {
        s.push('+');
    }
    s
}

pub fn format_line(entry: &ListingLine) -> String {
    let comment = entry
        .line
        .comment
        .as_ref()
        .map(|s| cformat!("<dim>;{}</>", s))
        .unwrap_or_default();
    let label = entry
        .line
        .label
        .as_ref()
        .map(|l| cformat!("<g>{}</>", l))
        .unwrap_or_default();
    let body = entry
        .line
        .stmt
        .as_ref()
        .map(|s| s.cformat())
        .unwrap_or_default();

    let addr = if entry.bytes.is_empty() && entry.line.label.is_none() {
        "    ".to_string()
    } else {
        format!("{:04X}", entry.address)
    };
    format!(
        "[{}] {:<9} | {:>4}: {} {} {}",
        addr,
        hex_bytes(&entry.bytes),
        entry.line.number,
        label,
        body,
        comment
    )
}

pub fn print_dump(lines: &[ListingLine]) {
    println!("-------------------+-----------------------------------------------------");
    for entry in lines {
        println!("{}", format_line(entry));
    }
    println!("-------------------+-----------------------------------------------------");
}

pub fn print_symbols(labels: &LabelTable) {
    for (name, addr) in labels.iter() {
        println!("{}", cformat!("  <c>${:04X}</> <g>{}</>", addr, name));
    }
}

pub fn print_analysis(lines: &[AnalyzedLine]) {
    println!("-------------------+-----------------------------------------------------");
    for line in lines {
        if let Some(label) = &line.label {
            println!("{:19}| {}", "", cformat!("<g>{}:</>", label));
        }
        let note = match &line.source {
            Some(src) => cformat!("<dim>; {}</>", src),
            None => cformat!("<dim>; {}</>", line.description),
        };
        println!(
            "[{:04X}] {:<9} |   {:<20} {}",
            line.address,
            hex_bytes(&line.bytes),
            line.text,
            note
        );
    }
    println!("-------------------+-----------------------------------------------------");
}
