use anyhow::{anyhow, Result};
use pest::iterators::Pair;
use pest::Parser;

/// Minimum trimmed length before a text line counts as a group header.
const HEADER_MIN_LEN: usize = 3;

#[derive(Parser)]
#[grammar = "bulk.pest"]
pub struct BulkParser;

#[derive(Clone, Debug, PartialEq)]
pub struct BulkRow {
    pub cage_no: u32,
    pub bird_count: u32,
    pub weight: f64,
    pub rate: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BulkGroup {
    pub party_name: String,
    pub rows: Vec<BulkRow>,
}

/// Parse result. `skipped` counts every line that was neither a header nor
/// a usable record, including records seen before the first header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkParse {
    pub groups: Vec<BulkGroup>,
    pub skipped: usize,
}

/// Convert loosely structured pasted text into groups of cage rows.
///
/// A line that does not start with a digit, contains a letter, and is
/// longer than three characters opens a new group; numeric lines become
/// rows of the currently open group. Everything else is skipped and
/// counted, so callers can warn the operator instead of dropping input
/// silently.
pub fn parse(input: &str) -> Result<BulkParse> {
    let mut pairs = BulkParser::parse(Rule::bulk, input)?;
    let bulk = pairs.next().ok_or(anyhow!("empty parse result"))?;

    let mut out = BulkParse::default();
    for pair in bulk.into_inner() {
        match pair.as_rule() {
            Rule::record => match parse_record(pair) {
                Ok(row) => match out.groups.last_mut() {
                    Some(group) => group.rows.push(row),
                    // record before any header: nothing to attach it to
                    None => out.skipped += 1,
                },
                Err(_) => out.skipped += 1,
            },
            Rule::text => {
                let line = pair.as_str().trim();
                if is_header(line) {
                    out.groups.push(BulkGroup {
                        party_name: line.to_string(),
                        rows: Vec::new(),
                    });
                } else {
                    out.skipped += 1;
                }
            }
            Rule::EOI => {}
            _ => return Err(anyhow!("unexpected token: {}", pair.as_str())),
        }
    }

    Ok(out)
}

fn is_header(line: &str) -> bool {
    !line.starts_with(|c: char| c.is_ascii_digit())
        && line.chars().any(char::is_alphabetic)
        && line.chars().count() > HEADER_MIN_LEN
}

fn parse_record(pair: Pair<Rule>) -> Result<BulkRow> {
    let mut tokens = pair.into_inner();
    let cage_no = next_number(&mut tokens)?.parse::<u32>()?;
    let bird_count = next_number(&mut tokens)?.parse::<u32>()?;
    let weight = next_number(&mut tokens)?.parse::<f64>()?;
    let rate = tokens
        .find(|t| t.as_rule() == Rule::float)
        .map(|t| t.as_str().parse::<f64>())
        .transpose()?;

    Ok(BulkRow {
        cage_no,
        bird_count,
        weight,
        rate,
    })
}

fn next_number<'a>(tokens: &mut pest::iterators::Pairs<'a, Rule>) -> Result<&'a str> {
    tokens
        .next()
        .map(|t| t.as_str())
        .ok_or(anyhow!("invalid record, numeric token expected"))
}
