use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use arbor_files::FileNode;
use arbor_tree::TreeReader;

use crate::error::LogResult;
use crate::lines::BlockText;
use crate::ngram::NgramQuery;
use crate::node::LogIndexNode;

/// Block counts for one search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Blocks whose text was read and scanned.
    pub scanned: u64,
    /// Blocks ruled out by their fingerprints.
    pub skipped: u64,
    /// Scanned blocks without a matching line.
    pub false_positive: u64,
}

/// A line containing the search term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchMatch {
    pub line_index: u64,
    /// The line including its terminator.
    pub text: Bytes,
}

/// Cursor over the lines that contain a term, in line order.
pub struct LogSearch {
    reader: TreeReader,
    text: Arc<FileNode>,
    index: Arc<LogIndexNode>,
    term: Vec<u8>,
    query: NgramQuery,
    start_line: u64,
    next_block: usize,
    pending: VecDeque<SearchMatch>,
    stats: SearchStats,
}

impl LogSearch {
    pub(crate) fn new(
        reader: TreeReader,
        text: Arc<FileNode>,
        index: Arc<LogIndexNode>,
        start_line: u64,
        term: Vec<u8>,
    ) -> Self {
        Self {
            next_block: index.block_for_line(start_line),
            query: NgramQuery::for_term(&term),
            reader,
            text,
            index,
            term,
            start_line,
            pending: VecDeque::new(),
            stats: SearchStats::default(),
        }
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub async fn next_match(&mut self) -> LogResult<Option<SearchMatch>> {
        loop {
            if let Some(found) = self.pending.pop_front() {
                return Ok(Some(found));
            }
            let Some(block) = self.index.blocks.get(self.next_block) else {
                debug!(
                    scanned = self.stats.scanned,
                    skipped = self.stats.skipped,
                    false_positive = self.stats.false_positive,
                    "log search complete"
                );
                return Ok(None);
            };
            self.next_block += 1;

            if !self.query.may_match(&block.ngrams) {
                self.stats.skipped += 1;
                continue;
            }
            self.stats.scanned += 1;

            let mut lines = BlockText::load(&self.reader, &self.text, block).await?;
            while let Some((line_index, text)) = lines.next_line() {
                if line_index >= self.start_line && line_contains(&text, &self.term) {
                    self.pending.push_back(SearchMatch { line_index, text });
                }
            }
            if self.pending.is_empty() {
                self.stats.false_positive += 1;
            }
        }
    }

    /// Drain the remaining matches.
    pub async fn collect(&mut self) -> LogResult<Vec<SearchMatch>> {
        let mut matches = Vec::new();
        while let Some(found) = self.next_match().await? {
            matches.push(found);
        }
        Ok(matches)
    }
}

/// Whether the line, without its terminator, contains `term`.
fn line_contains(line: &[u8], term: &[u8]) -> bool {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    term.is_empty() || line.windows(term.len()).any(|window| window == term)
}

impl std::fmt::Debug for LogSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSearch")
            .field("term_len", &self.term.len())
            .field("next_block", &self.next_block)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build, init_tracing, sample_log, small_options, store};
    use proptest::prelude::*;

    fn brute_force(text: &[u8], start_line: u64, term: &[u8]) -> Vec<u64> {
        text.split_inclusive(|&b| b == b'\n')
            .enumerate()
            .filter(|(i, line)| *i as u64 >= start_line && line_contains(line, term))
            .map(|(i, _)| i as u64)
            .collect()
    }

    async fn matching_lines(search: &mut LogSearch) -> Vec<u64> {
        search
            .collect()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.line_index)
            .collect()
    }

    #[tokio::test]
    async fn finds_every_matching_line() {
        init_tracing();
        let text = sample_log(300);
        let log = build(&text, small_options(10));
        let (reader, stored) = store(&log).await;

        for term in [&b"unit-42"[..], &b"WARN step 1"[..], &b"step 299:"[..], &b"compiled"[..]] {
            let mut search = stored.search(&reader, 0, term).await.unwrap();
            assert_eq!(matching_lines(&mut search).await, brute_force(&text, 0, term));
        }
    }

    #[tokio::test]
    async fn matches_carry_line_text() {
        let log = build(b"zero\none needle\ntwo\nthree needle\n", small_options(2));
        let (reader, stored) = store(&log).await;
        let mut search = stored.search(&reader, 0, "needle").await.unwrap();

        let first = search.next_match().await.unwrap().unwrap();
        assert_eq!(first.line_index, 1);
        assert_eq!(&first.text[..], b"one needle\n");
        let second = search.next_match().await.unwrap().unwrap();
        assert_eq!(second.line_index, 3);
        assert!(search.next_match().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_term_skips_every_block() {
        let text = sample_log(200);
        let log = build(&text, small_options(10));
        let (reader, stored) = store(&log).await;

        let mut search = stored.search(&reader, 0, "segfault").await.unwrap();
        assert!(search.next_match().await.unwrap().is_none());
        let stats = search.stats();
        assert_eq!(stats.skipped, 20);
        assert_eq!(stats.scanned, 0);
        assert_eq!(stats.false_positive, 0);
    }

    #[tokio::test]
    async fn short_terms_use_prefix_ranges() {
        let text = b"abc\nxyz\nqqq\nzab\n";
        let log = build(text, small_options(1));
        let (reader, stored) = store(&log).await;

        let mut search = stored.search(&reader, 0, "ab").await.unwrap();
        assert_eq!(matching_lines(&mut search).await, vec![0, 3]);
        assert_eq!(search.stats().skipped, 2);

        let mut search = stored.search(&reader, 0, "y").await.unwrap();
        assert_eq!(matching_lines(&mut search).await, vec![1]);
        assert_eq!(search.stats().scanned, 1);
    }

    #[tokio::test]
    async fn empty_term_matches_every_line() {
        let text = sample_log(25);
        let log = build(&text, small_options(4));
        let (reader, stored) = store(&log).await;

        let mut search = stored.search(&reader, 5, "").await.unwrap();
        assert_eq!(matching_lines(&mut search).await, (5..25).collect::<Vec<_>>());
        assert_eq!(search.stats().skipped, 0);
    }

    #[tokio::test]
    async fn start_line_filters_matches() {
        let text = sample_log(120);
        let log = build(&text, small_options(16));
        let (reader, stored) = store(&log).await;

        for start in [0u64, 17, 50, 119, 120] {
            let mut search = stored.search(&reader, start, "INFO").await.unwrap();
            assert_eq!(
                matching_lines(&mut search).await,
                brute_force(&text, start, b"INFO"),
                "start {start}"
            );
        }
    }

    #[tokio::test]
    async fn scanned_block_without_match_is_a_false_positive() {
        // Both 4-grams of "abcde" occur, but never together in one line.
        let text = b"xabcdx\nybcdey\n";
        let log = build(text, small_options(10));
        let (reader, stored) = store(&log).await;

        let mut search = stored.search(&reader, 0, "abcde").await.unwrap();
        assert!(search.next_match().await.unwrap().is_none());
        assert_eq!(
            search.stats(),
            SearchStats {
                scanned: 1,
                skipped: 0,
                false_positive: 1
            }
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn search_has_no_false_negatives(
            lines in proptest::collection::vec("[abc ]{0,24}", 1..60),
            pick in any::<usize>(),
            from in any::<usize>(),
            len in 1usize..8,
            block_lines in 1usize..12,
        ) {
            let text: Vec<u8> = lines.iter().flat_map(|l| format!("{l}\n").into_bytes()).collect();
            let source = lines[pick % lines.len()].as_bytes();
            let term: Vec<u8> = if source.is_empty() {
                b"a".to_vec()
            } else {
                let from = from % source.len();
                source[from..(from + len).min(source.len())].to_vec()
            };

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (found, stats) = runtime.block_on(async {
                let log = build(&text, small_options(block_lines));
                let (reader, stored) = store(&log).await;
                let mut search = stored.search(&reader, 0, term.clone()).await.unwrap();
                let found = matching_lines(&mut search).await;
                (found, search.stats())
            });

            prop_assert_eq!(found, brute_force(&text, 0, &term));
            prop_assert!(stats.false_positive <= stats.scanned);
            let blocks = (lines.len() + block_lines - 1) / block_lines;
            prop_assert_eq!((stats.scanned + stats.skipped) as usize, blocks);
        }

        #[test]
        fn missing_byte_never_matches(
            lines in proptest::collection::vec("[abc ]{0,24}", 1..40),
            term in "[abc]{0,5}#[abc]{0,5}",
        ) {
            let text: Vec<u8> = lines.iter().flat_map(|l| format!("{l}\n").into_bytes()).collect();
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let found = runtime.block_on(async {
                let log = build(&text, small_options(4));
                let (reader, stored) = store(&log).await;
                let mut search = stored.search(&reader, 0, term.as_bytes()).await.unwrap();
                matching_lines(&mut search).await
            });
            prop_assert!(found.is_empty());
        }
    }
}
