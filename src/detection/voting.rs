//! Weighted per-character voting and the sequence format validator.
//!
//! The same plurality vote runs twice: once over the variant candidates of a
//! single ROI, and once over the ROI winners of a line group. A voted value
//! that fails the plausibility check loses to the first candidate that passes.

use crate::config::DetectorConfig;
use crate::error::DetectError;
use crate::models::SequenceResult;
use regex::Regex;
use std::collections::HashSet;

/// Sequences shorter than this cannot carry a year and serial
pub const MIN_SEQUENCE_LEN: usize = 13;

/// `true` iff `s` has at least 13 characters and the two at `[-10..-8]`
/// read as a year in `20..=99`
pub fn is_valid_sequence(s: &str) -> bool {
    let bytes = s.as_bytes();
    let n = bytes.len();
    if s.chars().count() < MIN_SEQUENCE_LEN || n < 10 {
        return false;
    }
    let (tens, ones) = (bytes[n - 10], bytes[n - 9]);
    if !tens.is_ascii_digit() || !ones.is_ascii_digit() {
        return false;
    }
    let year = (tens - b'0') * 10 + (ones - b'0');
    (20..=99).contains(&year)
}

/// Prefixed digit pattern asset sequences are extracted with
#[derive(Debug, Clone)]
pub struct SequenceFormat {
    prefix: String,
    pattern: Regex,
}

impl SequenceFormat {
    pub fn new(prefix: &str, min_body: usize, max_body: usize) -> Result<Self, DetectError> {
        let max_body = max_body.max(min_body);
        let pattern = Regex::new(&format!(r"^{}\d{{{},{}}}", regex::escape(prefix), min_body, max_body))
            .map_err(|e| DetectError::Config(format!("sequence pattern: {}", e)))?;
        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self, DetectError> {
        Self::new(&config.code_prefix, config.min_body_digits, config.max_body_digits)
    }

    /// Longest substring of `digits` matching the pattern; the earliest wins on equal length
    pub fn extract(&self, digits: &str) -> Option<String> {
        let mut best: Option<&str> = None;
        for (start, _) in digits.match_indices(self.prefix.as_str()) {
            if let Some(m) = self.pattern.find(&digits[start..]) {
                if best.is_none_or(|b| m.as_str().len() > b.len()) {
                    best = Some(m.as_str());
                }
            }
        }
        best.map(str::to_string)
    }
}

/// Confidence-weighted per-character plurality vote.
///
/// Only candidates of the modal length take part (ties broken by total
/// confidence, then by first appearance). The result's confidence is the mean
/// confidence of the participating candidates.
pub fn vote(candidates: &[SequenceResult]) -> Option<SequenceResult> {
    // (length, count, total confidence) in first-seen order
    let mut lengths: Vec<(usize, usize, f32)> = Vec::new();
    for c in candidates {
        let len = c.sequence.chars().count();
        match lengths.iter_mut().find(|(l, _, _)| *l == len) {
            Some(entry) => {
                entry.1 += 1;
                entry.2 += c.confidence;
            }
            None => lengths.push((len, 1, c.confidence)),
        }
    }

    let mut modal = *lengths.first()?;
    for &entry in &lengths[1..] {
        if entry.1 > modal.1 || (entry.1 == modal.1 && entry.2 > modal.2) {
            modal = entry;
        }
    }
    let (len, count, total) = modal;

    let pool: Vec<(Vec<char>, f32)> = candidates
        .iter()
        .filter(|c| c.sequence.chars().count() == len)
        .map(|c| (c.sequence.chars().collect(), c.confidence))
        .collect();
    let weighted = total > 0.0;

    let mut sequence = String::with_capacity(len);
    for pos in 0..len {
        let mut tally: Vec<(char, f32)> = Vec::new();
        for (chars, confidence) in &pool {
            let weight = if weighted { *confidence } else { 1.0 };
            let ch = chars[pos];
            match tally.iter_mut().find(|(c, _)| *c == ch) {
                Some(entry) => entry.1 += weight,
                None => tally.push((ch, weight)),
            }
        }
        let mut winner = tally[0];
        for &entry in &tally[1..] {
            if entry.1 > winner.1 {
                winner = entry;
            }
        }
        sequence.push(winner.0);
    }

    Some(SequenceResult {
        sequence,
        confidence: total / count as f32,
    })
}

/// Vote, then fall back to the first individually valid candidate if the
/// voted value is implausible. `None` when nothing in the pool is valid.
pub fn resolve(candidates: &[SequenceResult]) -> Option<SequenceResult> {
    match vote(candidates) {
        Some(voted) if is_valid_sequence(&voted.sequence) => Some(voted),
        _ => candidates.iter().find(|c| is_valid_sequence(&c.sequence)).cloned(),
    }
}

/// Keep the first occurrence of each code
pub fn dedup_codes(codes: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for code in codes {
        if seen.insert(code.clone()) {
            unique.push(code);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str, confidence: f32) -> SequenceResult {
        SequenceResult {
            sequence: s.to_string(),
            confidence,
        }
    }

    #[test]
    fn validity_checks_length_and_year_window() {
        assert!(is_valid_sequence("0424102470200259"));
        assert!(is_valid_sequence("1232070200259"));
        assert!(!is_valid_sequence("232070200259"));
        assert!(!is_valid_sequence("0424101970200259"));
        assert!(is_valid_sequence("0424109970200259"));
        assert!(!is_valid_sequence("042410x470200259"));
        assert!(!is_valid_sequence(""));
    }

    #[test]
    fn weighted_vote_prefers_confident_characters() {
        let pool = [seq("123456", 80.0), seq("123450", 40.0), seq("123456", 90.0)];
        let voted = vote(&pool).unwrap();
        assert_eq!(voted.sequence, "123456");
        assert_eq!(voted.confidence, 70.0);
    }

    #[test]
    fn weight_can_beat_headcount() {
        let pool = [seq("111", 10.0), seq("121", 10.0), seq("131", 90.0)];
        assert_eq!(vote(&pool).unwrap().sequence, "131");
    }

    #[test]
    fn zero_confidence_falls_back_to_plurality() {
        let pool = [seq("19", 0.0), seq("12", 0.0), seq("12", 0.0)];
        assert_eq!(vote(&pool).unwrap().sequence, "12");
    }

    #[test]
    fn modal_length_wins_and_ties_go_to_confidence() {
        let pool = [seq("1234", 10.0), seq("12345", 50.0), seq("1239", 10.0), seq("12355", 50.0)];
        assert_eq!(vote(&pool).unwrap().sequence.len(), 5);
        assert!(vote(&[]).is_none());
    }

    #[test]
    fn valid_candidate_beats_invalid_vote() {
        // the vote mixes the year digits into "19"
        let pool = [seq("0424101970200259", 60.0), seq("0424102970200259", 50.0), seq("0424191970200259", 40.0)];
        let resolved = resolve(&pool).unwrap();
        assert_eq!(resolved.sequence, "0424102970200259");
        assert!(resolve(&[seq("1234", 99.0)]).is_none());
    }

    #[test]
    fn extraction_finds_longest_prefixed_run() {
        let format = SequenceFormat::new("04", 9, 14).unwrap();
        assert_eq!(format.extract("77042410247020025911").as_deref(), Some("0424102470200259"));
        assert_eq!(format.extract("0412345678").as_deref(), None);
        assert_eq!(format.extract("12304123456789").as_deref(), Some("04123456789"));
        assert_eq!(format.extract(""), None);
    }

    #[test]
    fn duplicates_are_dropped_in_order() {
        let codes = dedup_codes(["b", "a", "b"].map(String::from));
        assert_eq!(codes, vec!["b", "a"]);
    }

    #[test]
    fn many_repeated_codes_keep_first_seen_order() {
        let codes: Vec<String> = (0..5000).map(|i| format!("{:04}", (i * 7) % 1000)).collect();
        let unique = dedup_codes(codes.clone());
        assert_eq!(unique.len(), 1000);
        assert_eq!(unique[..3], codes[..3]);
        assert_eq!(unique.iter().collect::<HashSet<_>>().len(), 1000);
    }
}
