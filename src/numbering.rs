use chrono::NaiveDate;
use indexmap::IndexMap;

const VOWELS: &str = "aeiou";
const MAX_INITIALS: usize = 4;
const CODE_LEN: usize = 3;

/// Known party names mapped to their preferred short codes. Keys are the
/// lowercase, letters-only form of the name so spacing and punctuation in
/// the typed name do not matter.
#[derive(Clone, Debug, Default)]
pub struct CodeMap(IndexMap<String, String>);

impl CodeMap {
    pub fn new() -> CodeMap {
        Default::default()
    }

    /// The vendor table the business already uses on paper.
    pub fn with_known_vendors() -> CodeMap {
        let mut map = CodeMap::new();
        for (name, code) in [
            ("Suguna", "sgn"),
            ("Sagar Poultry Farm", "sgr"),
            ("Krishna Chicken Center", "kcc"),
            ("Balaji Poultry", "blj"),
            ("Shree Ganesh Farm", "sgf"),
            ("Radha Krishna Poultry", "rkp"),
        ] {
            map.insert(name, code);
        }
        map
    }

    pub fn insert(&mut self, name: &str, code: &str) {
        self.0.insert(normalize(name), code.to_lowercase());
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.0.get(&normalize(name)).map(String::as_str)
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_lowercase()
}

/// Short alphabetic code for a party name. Pure function of the name and
/// the mapping table: same inputs, same code. Two different names can
/// still collide on a code; the date and suffix keep numbers unique.
pub fn party_code(name: &str, map: &CodeMap) -> String {
    if let Some(code) = map.lookup(name) {
        return code.to_string();
    }

    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() > 1 {
        return words
            .iter()
            .take(MAX_INITIALS)
            .filter_map(|w| w.chars().next())
            .collect::<String>()
            .to_lowercase();
    }

    let lower = name.to_lowercase();
    let consonants: String = lower
        .chars()
        .filter(|c| c.is_ascii_alphabetic() && !VOWELS.contains(*c))
        .take(CODE_LEN)
        .collect();
    if consonants.len() >= CODE_LEN {
        consonants
    } else {
        lower.chars().take(CODE_LEN).collect()
    }
}

/// Code plus the document date as ddmmyy.
pub fn base_number(code: &str, date: NaiveDate) -> String {
    format!("{}{}", code, date.format("%d%m%y"))
}

/// Final number for the (existing + 1)-th document sharing a base: the
/// first gets the bare base, collisions get `a`, `b`, ... After `z` the
/// suffix continues `aa`, `ab`, ... so the scheme never runs out.
pub fn document_number(base: &str, existing: usize) -> String {
    format!("{}{}", base, suffix(existing))
}

/// Next free number given the numbers already issued for this base. The
/// suffix advances past the highest one seen, not past the document
/// count, so a deleted document can never cause a number to be minted
/// twice.
pub fn next_number<'a, I>(base: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let next = existing
        .into_iter()
        .filter_map(|number| number.strip_prefix(base).and_then(suffix_index))
        .map(|index| index + 1)
        .max()
        .unwrap_or(0);
    document_number(base, next)
}

/// Inverse of `suffix`: "" is 0, "a" is 1, "z" is 26, "aa" is 27.
fn suffix_index(s: &str) -> Option<usize> {
    let mut n = 0usize;
    for c in s.chars() {
        if !c.is_ascii_lowercase() {
            return None;
        }
        n = n * 26 + (c as usize - 'a' as usize + 1);
    }
    Some(n)
}

fn suffix(mut n: usize) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::{base_number, document_number, next_number, party_code, suffix, suffix_index, CodeMap};
    use anyhow::{anyhow, Result};
    use chrono::NaiveDate;

    #[test]
    fn mapped_name_wins() {
        let map = CodeMap::with_known_vendors();
        assert_eq!(party_code("Suguna", &map), "sgn");
        // spacing and case do not matter for the lookup
        assert_eq!(party_code("  suguna ", &map), "sgn");
        assert_eq!(party_code("Krishna Chicken Center", &map), "kcc");
    }

    #[test]
    fn multi_word_takes_initials() {
        let map = CodeMap::new();
        assert_eq!(party_code("Beta Farms", &map), "bf");
        assert_eq!(party_code("Shree Ganesh Broiler Trading Co", &map), "sgbt");
    }

    #[test]
    fn single_word_takes_consonants_or_prefix() {
        let map = CodeMap::new();
        // s, k, y, l, n are consonants here; the first three are kept
        assert_eq!(party_code("Skyline", &map), "sky");
        // fewer than three consonants falls back to the verbatim prefix
        assert_eq!(party_code("Aeio", &map), "aei");
        assert_eq!(party_code("Om", &map), "om");
    }

    #[test]
    fn code_is_deterministic() {
        let map = CodeMap::with_known_vendors();
        let a = party_code("Balaji Poultry", &map);
        let b = party_code("Balaji Poultry", &map);
        assert_eq!(a, b);
    }

    #[test]
    fn suffix_sequence() {
        assert_eq!(suffix(0), "");
        assert_eq!(suffix(1), "a");
        assert_eq!(suffix(2), "b");
        assert_eq!(suffix(26), "z");
        assert_eq!(suffix(27), "aa");
    }

    #[test]
    fn suffix_index_inverts_suffix() {
        for n in [0usize, 1, 2, 25, 26, 27, 52, 703] {
            assert_eq!(suffix_index(&suffix(n)), Some(n));
        }
        assert_eq!(suffix_index("A"), None);
        assert_eq!(suffix_index("3"), None);
    }

    #[test]
    fn next_number_skips_past_the_highest_issued() {
        // nothing issued yet: the bare base
        assert_eq!(next_number("sgn030524", std::iter::empty()), "sgn030524");
        // base and `a` issued, base later deleted: `a` must not repeat
        assert_eq!(next_number("sgn030524", ["sgn030524a"]), "sgn030524b");
        assert_eq!(
            next_number("sgn030524", ["sgn030524", "sgn030524a"]),
            "sgn030524b"
        );
        // numbers for other bases are ignored
        assert_eq!(
            next_number("sgn030524", ["sgn040524", "sgn040524a"]),
            "sgn030524"
        );
    }

    #[test]
    fn suguna_scenario() -> Result<()> {
        let map = CodeMap::with_known_vendors();
        let date = NaiveDate::from_ymd_opt(2024, 5, 3).ok_or(anyhow!("invalid date"))?;
        let base = base_number(&party_code("Suguna", &map), date);
        assert_eq!(document_number(&base, 0), "sgn030524");
        assert_eq!(document_number(&base, 1), "sgn030524a");
        assert_eq!(document_number(&base, 2), "sgn030524b");
        Ok(())
    }
}
