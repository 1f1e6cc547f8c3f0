use std::collections::{BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Name used when no candidate list was supplied.
pub const FALLBACK_NICK: &str = "user";

/// Characters stripped from candidate lists (channel and status prefixes).
const STRIPPED_CHARS: &[char] = &['#', '~', '&', '@', '%', '+'];

/// Passes during which a repeated nick may get a run of `_` or `-`.
const SYMBOL_SUFFIX_PASSES: usize = 5;

/// Probability of each symbol style being rejected in turn.
const SYMBOL_REJECT_PROBABILITY: f64 = 0.3;

/// Hands out nicknames from a candidate pool.
///
/// The first pass returns every candidate once. Later passes reuse the pool
/// with a suffix derived from the pass number: a run of underscores or
/// hyphens as long as the pass number during the first few passes, the pass
/// number in decimal otherwise. A nick is never handed out twice.
pub struct NickSelector<R = StdRng> {
    nicks: Vec<String>,
    selected: usize,
    loop_count: usize,
    random_order: bool,
    started: bool,
    issued: HashSet<String>,
    rng: R,
}

impl NickSelector<StdRng> {
    /// Builds a selector from free text, one nick per line (any whitespace
    /// separates entries).
    pub fn from_list(nick_list: &str) -> Self {
        Self::with_rng(parse_nick_list(nick_list), StdRng::from_entropy())
    }
}

impl<R: Rng> NickSelector<R> {
    pub fn with_rng(nicks: Vec<String>, rng: R) -> Self {
        let mut seen = HashSet::new();
        let nicks = nicks
            .into_iter()
            .filter(|nick| !nick.is_empty() && seen.insert(nick.clone()))
            .collect();
        NickSelector {
            nicks,
            selected: 0,
            loop_count: 0,
            random_order: false,
            started: false,
            issued: HashSet::new(),
            rng,
        }
    }

    pub fn random_order(mut self, random_order: bool) -> Self {
        self.random_order = random_order;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.nicks.len()
    }

    pub fn get_nick(&mut self) -> String {
        if self.started {
            self.selected += 1;
            if self.selected == self.nicks.len() {
                self.selected = 0;
                self.loop_count += 1;
                if self.random_order {
                    self.nicks.shuffle(&mut self.rng);
                }
            }
        } else {
            self.started = true;
            if self.nicks.is_empty() {
                self.nicks.push(FALLBACK_NICK.to_owned());
            }
            if self.random_order {
                self.nicks.shuffle(&mut self.rng);
            } else {
                self.nicks.sort();
            }
        }

        let base = self.nicks[self.selected].clone();
        let mut nick = self.decorate(base);
        // a suffixed nick can still collide with another candidate
        while self.issued.contains(&nick) {
            nick.push_str(&self.loop_count.max(1).to_string());
        }
        self.issued.insert(nick.clone());
        nick
    }

    fn decorate(&mut self, mut nick: String) -> String {
        let passes = self.loop_count;
        if passes == 0 {
            return nick;
        }

        if passes < SYMBOL_SUFFIX_PASSES && self.rng.gen_bool(1.0 - SYMBOL_REJECT_PROBABILITY) {
            nick.push_str(&"_".repeat(passes));
        } else if passes < SYMBOL_SUFFIX_PASSES
            && self.rng.gen_bool(1.0 - SYMBOL_REJECT_PROBABILITY)
        {
            nick.push_str(&"-".repeat(passes));
        } else {
            nick.push_str(&passes.to_string());
        }
        nick
    }
}

/// Splits a nick list into distinct candidates, dropping channel and status
/// prefix characters. Case is preserved; order is not.
pub fn parse_nick_list(nick_list: &str) -> Vec<String> {
    let unique: BTreeSet<String> = nick_list
        .split_whitespace()
        .map(|entry| entry.replace(STRIPPED_CHARS, ""))
        .filter(|nick| !nick.is_empty())
        .collect();
    unique.into_iter().collect()
}
