// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

//! Map name matching against a map catalog.
//!
//! Servers report map titles in many decorated forms (`TO-Verdant`,
//! `"Code-name: Verdant"`, `=FoE=Verdant`, ...). Names are collapsed to a
//! normalized key and compared with a layered heuristic.

use std::{fs, path::Path};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Text prefixes removed before the game prefixes.
const TEXT_PREFIXES: [&str; 3] = ["Code-name:", "Codename:", "2nd -W-"];

/// Game and clan prefixes, the first match is removed.
const GAME_PREFIXES: [&str; 11] = [
    "TO-", "CTF-", "DM-", "AS-", "=FoE=", "-FoE-", "@8-", "-2-", "-X-", "2W-", "SWAT-",
];

/// Normalized names of renamed maps and their catalog names.
const ALIASES: [(&str, &str); 6] = [
    ("terroristmansion", "TO-TerrorMansion"),
    ("terrorsmansion", "TO-TerrorMansion"),
    ("terrormansion", "TO-TerrorMansion"),
    ("cia", "TO-CIA"),
    ("glasgowkiss", "TO-GlasgowKiss"),
    ("avalanche", "TO-Avalanche"),
];

/// Shorter normalized names are too ambiguous for fuzzy matching.
const MIN_FUZZY_LEN: usize = 3;
/// Minimal length for suffix, containment and common substring matches.
const MIN_PART_LEN: usize = 4;
const MAX_EDIT_DISTANCE: usize = 3;

/// Scores of a band stay in `floor + 1..floor + BAND_WIDTH`.
const BAND_WIDTH: i64 = 100_000;

const SCORE_EXACT: i64 = 600_000;
const SCORE_SUFFIX: i64 = 500_000;
const SCORE_REVERSE_SUFFIX: i64 = 400_000;
const SCORE_CONTAINS: i64 = 300_000;
const SCORE_REVERSE_CONTAINS: i64 = 200_000;
const SCORE_EDIT: i64 = 100_000;
const SCORE_COMMON: i64 = 0;

/// Map catalog entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapCatalogEntry {
    /// Display name, e.g. `TO-Verdant`.
    pub name: String,
    /// Download page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Thumbnail image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_small: Option<String>,
    /// Medium preview image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Large preview image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_big: Option<String>,
}

impl MapCatalogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the small preview, the regular one if missing.
    pub fn preview_url_small(&self) -> Option<&str> {
        non_empty(&self.preview_small).or_else(|| non_empty(&self.preview))
    }

    /// Returns the big preview, the regular one if missing.
    pub fn preview_url_large(&self) -> Option<&str> {
        non_empty(&self.preview_big).or_else(|| non_empty(&self.preview))
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

/// Loaded map catalog.
#[derive(Clone, Debug, Default)]
pub struct MapCatalog {
    entries: Vec<MapCatalogEntry>,
}

impl MapCatalog {
    pub fn new(entries: Vec<MapCatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parses a JSON array of map objects.
    ///
    /// Field names are matched ignoring case, entries without a name are
    /// skipped.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let items: Vec<Value> = serde_json::from_str(text)?;
        let entries = items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|obj| {
                let field = |key: &str| {
                    obj.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(key))
                        .and_then(|(_, v)| v.as_str())
                        .map(str::to_owned)
                };
                Some(MapCatalogEntry {
                    name: field("name")?,
                    url: field("url"),
                    preview_small: field("previewSmall"),
                    preview: field("preview"),
                    preview_big: field("previewBig"),
                })
            })
            .collect::<Vec<_>>();
        debug!("map catalog: {} of {} entries", entries.len(), items.len());
        Ok(Self::new(entries))
    }

    /// Reads a cached catalog file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::CatalogFile {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn entries(&self) -> &[MapCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// See [`find_best_match`].
    pub fn find_best_match(&self, raw: &str) -> Option<&MapCatalogEntry> {
        find_best_match(raw, &self.entries)
    }
}

/// Decodes HTML character references.
///
/// Unknown references are kept as is.
fn decode_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest.find(';').and_then(|end| {
            let c = match &rest[1..end] {
                "amp" => '&',
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" => '\'',
                "nbsp" => '\u{a0}',
                s => {
                    let n = match s.strip_prefix('#')? {
                        h if h.starts_with(['x', 'X']) => u32::from_str_radix(&h[1..], 16).ok()?,
                        d => d.parse().ok()?,
                    };
                    char::from_u32(n)?
                }
            };
            Some((c, end + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Collapses a map name to the key used for matching.
///
/// The result contains only lower-case alphanumerics and square brackets.
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let decoded = decode_html(raw);
    let mut name = decoded.trim_matches(['\'', '"']).trim();

    for prefix in TEXT_PREFIXES {
        if let Some(s) = strip_prefix_ignore_case(name, prefix) {
            name = s.trim();
            break;
        }
    }

    let name = name.replace("'s ", "").replace("'s", "");
    let mut name = name.as_str();

    for prefix in GAME_PREFIXES {
        if let Some(s) = strip_prefix_ignore_case(name, prefix) {
            name = s;
            break;
        }
    }

    name.to_lowercase()
        .chars()
        .filter(|&c| c.is_alphanumeric() || c == '[' || c == ']')
        .collect()
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn longest_common_substring(a: &[char], b: &[char]) -> usize {
    let mut best = 0;
    let mut prev = vec![0; b.len() + 1];
    let mut cur = vec![0; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            best = best.max(cur[j + 1]);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

fn band(floor: i64, value: i64) -> i64 {
    floor + value.clamp(1, BAND_WIDTH - 1)
}

/// Scores a catalog name against the input, zero means no match.
fn score(input: &[char], raw_len: usize, entry_key: &[char], entry_len: usize) -> i64 {
    let (il, el) = (input.len(), entry_key.len());
    let name_len = entry_len as i64;
    let top = BAND_WIDTH - 1;

    if input == entry_key {
        let penalty = raw_len.abs_diff(entry_len) as i64;
        band(SCORE_EXACT, top - penalty * 1000 - name_len)
    } else if entry_key.ends_with(input) && il >= MIN_PART_LEN {
        band(SCORE_SUFFIX, top - (el - il) as i64 * 100 - name_len)
    } else if input.ends_with(entry_key) && el >= MIN_PART_LEN {
        band(SCORE_REVERSE_SUFFIX, top - (il - el) as i64 * 100 - name_len)
    } else if il >= MIN_PART_LEN && contains(entry_key, input) {
        let quality = (il * 100 / el) as i64;
        band(SCORE_CONTAINS, quality * 1000 - name_len)
    } else if el >= MIN_PART_LEN && contains(input, entry_key) {
        let quality = (el * 100 / il) as i64;
        band(SCORE_REVERSE_CONTAINS, quality * 1000 - name_len)
    } else if il.abs_diff(el) <= MAX_EDIT_DISTANCE
        && levenshtein(input, entry_key) <= MAX_EDIT_DISTANCE
    {
        let distance = levenshtein(input, entry_key) as i64;
        band(SCORE_EDIT, top - distance * 10_000 - name_len)
    } else {
        let common = longest_common_substring(input, entry_key);
        // at least 60% of the shorter name
        if common >= MIN_PART_LEN && common * 10 >= il.min(el) * 6 {
            band(SCORE_COMMON, common as i64 * 1000 - name_len)
        } else {
            0
        }
    }
}

fn contains(haystack: &[char], needle: &[char]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn find_alias<'a>(target: &str, catalog: &'a [MapCatalogEntry]) -> Option<&'a MapCatalogEntry> {
    if let Some(i) = catalog
        .iter()
        .find(|i| i.name.eq_ignore_ascii_case(target))
    {
        return Some(i);
    }

    let suffix = target.strip_prefix("TO-").unwrap_or(target).to_lowercase();
    if let Some(i) = catalog
        .iter()
        .find(|i| i.name.to_lowercase().ends_with(&suffix))
    {
        return Some(i);
    }

    let part = target.replace("TO-", "").replace('-', "").to_lowercase();
    catalog.iter().find(|i| {
        i.name
            .replace(['-', '_'], "")
            .to_lowercase()
            .contains(&part)
    })
}

/// Returns the catalog entry that best matches a reported map name.
///
/// Lookup order: known aliases, exact normalized match, scored fuzzy match.
/// Ties prefer the shorter catalog name.
pub fn find_best_match<'a>(
    raw: &str,
    catalog: &'a [MapCatalogEntry],
) -> Option<&'a MapCatalogEntry> {
    if raw.is_empty() || catalog.is_empty() {
        return None;
    }

    let key = normalize(raw);
    if let Some((_, target)) = ALIASES.iter().find(|(alias, _)| *alias == key) {
        if let Some(entry) = find_alias(target, catalog) {
            return Some(entry);
        }
    }

    let input: Vec<char> = key.chars().collect();
    let raw_len = raw.chars().count();
    let keys: Vec<Vec<char>> = catalog
        .iter()
        .map(|i| normalize(&i.name).chars().collect())
        .collect();

    let exact = best_scored(&input, raw_len, catalog, &keys, |key| *key == input);
    if exact.is_some() {
        return exact;
    }

    if input.len() < MIN_FUZZY_LEN {
        return None;
    }

    best_scored(&input, raw_len, catalog, &keys, |_| true)
}

fn best_scored<'a, F>(
    input: &[char],
    raw_len: usize,
    catalog: &'a [MapCatalogEntry],
    keys: &[Vec<char>],
    filter: F,
) -> Option<&'a MapCatalogEntry>
where
    F: Fn(&Vec<char>) -> bool,
{
    let mut best: Option<(i64, usize, &MapCatalogEntry)> = None;
    for (entry, entry_key) in catalog.iter().zip(keys).filter(|(_, k)| filter(*k)) {
        let name_len = entry.name.chars().count();
        let score = score(input, raw_len, entry_key, name_len);
        if score <= 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((s, len, _)) => score > s || (score == s && name_len < len),
        };
        if better {
            best = Some((score, name_len, entry));
        }
    }
    best.map(|(_, _, entry)| entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> Vec<MapCatalogEntry> {
        names.iter().map(|&i| MapCatalogEntry::new(i)).collect()
    }

    fn best<'a>(raw: &str, catalog: &'a [MapCatalogEntry]) -> Option<&'a str> {
        find_best_match(raw, catalog).map(|i| i.name.as_str())
    }

    #[test]
    fn html_entities() {
        assert_eq!(decode_html("Rock &amp; Roll"), "Rock & Roll");
        assert_eq!(decode_html("&#39;Quoted&#x27;"), "'Quoted'");
        assert_eq!(decode_html("a &unknown; b & c"), "a &unknown; b & c");
        assert_eq!(decode_html("&#xZZ;&"), "&#xZZ;&");
    }

    #[test]
    fn normalize_names() {
        assert_eq!(normalize("TO-Verdant"), "verdant");
        assert_eq!(normalize("\"Code-name: Verdant\""), "verdant");
        assert_eq!(normalize("Codename:Verdant"), "verdant");
        assert_eq!(normalize("2nd -W- Verdant"), "verdant");
        assert_eq!(normalize("=FoE=Verdant"), "verdant");
        assert_eq!(normalize("swat-Verdant"), "verdant");
        assert_eq!(normalize("Terrorist's Mansion"), "terroristmansion");
        assert_eq!(normalize("TO-Rock&amp;Roll (v2)"), "rockrollv2");
        assert_eq!(normalize("TO-Deck16]["), "deck16][");
        assert_eq!(normalize("'TO-Thunder_Hill'"), "thunderhill");
        // only the first game prefix is removed
        assert_eq!(normalize("TO-CTF-Face"), "ctfface");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let names = [
            "TO-Verdant",
            "\"Code-name: Verdant\"",
            "=FoE=Deck16][`",
            "2nd -W- TO-Ship's Deck",
            "Rock &amp; Roll",
            "-X-Dust v2",
            "ÄÖÜ-Straße",
            "İstanbul",
            "&lt;TO-Foo&gt;",
        ];
        for name in names {
            let once = normalize(name);
            assert_eq!(normalize(&once), once, "{name}");
        }
    }

    #[test]
    fn alias_hit() {
        let c = catalog(&["TO-Avalanche"]);
        assert_eq!(best("avalanche", &c), Some("TO-Avalanche"));

        let c = catalog(&["TO-Mansion", "TO-Terror_Mansion"]);
        assert_eq!(best("Terrorist's Mansion", &c), Some("TO-Terror_Mansion"));

        let c = catalog(&["SWAT-CIA"]);
        assert_eq!(best("CIA", &c), Some("SWAT-CIA"));
    }

    #[test]
    fn exact_prefers_decorated_match() {
        let c = catalog(&["TO-Deck16", "TO-Deck16][", "TO-Deck17"]);
        assert_eq!(best("Deck16][`", &c), Some("TO-Deck16]["));
        assert_eq!(best("Deck16", &c), Some("TO-Deck16"));
    }

    #[test]
    fn exact_closest_length() {
        let c = catalog(&["DM-Verdant", "TO-Verdant-"]);
        assert_eq!(best("TO-Verdant", &c), Some("DM-Verdant"));
    }

    #[test]
    fn short_input() {
        let c = catalog(&["TO-Abc", "TO-Abyss"]);
        assert_eq!(best("ab", &c), None);
        assert_eq!(best("", &c), None);
        assert_eq!(best("Verdant", &[]), None);
    }

    #[test]
    fn bands() {
        // catalog name ends with the input
        let c = catalog(&["TO-OperationVerdant", "TO-Dust"]);
        assert_eq!(best("Verdant", &c), Some("TO-OperationVerdant"));

        // input ends with the catalog name
        let c = catalog(&["TO-Rapid", "TO-Dust"]);
        assert_eq!(best("SuperRapid", &c), Some("TO-Rapid"));

        // containment beats edit distance
        let c = catalog(&["TO-Verdan", "TO-TheVerdantHill"]);
        assert_eq!(best("Verdant", &c), Some("TO-TheVerdantHill"));

        // edit distance
        let c = catalog(&["TO-Verdant", "TO-Blister"]);
        assert_eq!(best("Verdnat", &c), Some("TO-Verdant"));

        // common substring
        let c = catalog(&["TO-HarbourNight", "TO-Dust"]);
        assert_eq!(best("HarbourDay", &c), Some("TO-HarbourNight"));

        let c = catalog(&["TO-Blister", "TO-Dust"]);
        assert_eq!(best("Winterfell", &c), None);
    }

    #[test]
    fn bands_do_not_overlap() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();

        let edit = score(&chars("verdnat"), 10, &chars("verdant"), 10);
        let long = "a".repeat(150);
        let input = chars(&format!("bbbb{long}cccc"));
        let entry = chars(&format!("dddd{long}eeee"));
        let common = score(&input, input.len(), &entry, entry.len() + 3);
        assert!(common > 0);
        assert!(common < edit, "{common} >= {edit}");

        let suffix = score(&chars("verdant"), 7, &chars("operationverdant"), 19);
        let exact = score(&chars("verdant"), 2000, &chars("verdant"), 10);
        assert!(exact > suffix, "{exact} <= {suffix}");
    }

    #[test]
    fn ties_prefer_shorter_name() {
        let c = catalog(&["TO-Scope-Verdant", "TO-ScopeVerdant"]);
        assert_eq!(best("scopeverdant", &c), Some("TO-ScopeVerdant"));
    }

    #[test]
    fn distances() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("abc"), &chars("abc")), 0);
        assert_eq!(longest_common_substring(&chars("harbourday"), &chars("harbournight")), 7);
        assert_eq!(longest_common_substring(&chars("abc"), &chars("")), 0);
    }

    #[test]
    fn catalog_json() {
        let json = r#"[
            {"Name": "TO-Verdant", "PREVIEWSMALL": "s.png", "preview": "p.png"},
            {"name": "TO-Blister", "previewBig": "b.png", "preview": ""},
            {"url": "nameless"},
            {"name": null},
            42
        ]"#;
        let catalog = MapCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);

        let verdant = catalog.find_best_match("Verdant").unwrap();
        assert_eq!(verdant.preview_url_small(), Some("s.png"));
        assert_eq!(verdant.preview_url_large(), Some("p.png"));

        let blister = &catalog.entries()[1];
        assert_eq!(blister.preview_url_small(), None);
        assert_eq!(blister.preview_url_large(), Some("b.png"));

        assert!(MapCatalog::from_json("{").is_err());
        assert!(matches!(
            MapCatalog::load("/nonexistent/maps.json"),
            Err(Error::CatalogFile { .. })
        ));
    }
}
