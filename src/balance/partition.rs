//! Enumeration of two-team splits of a player pool

use crate::types::{Partition, Player};

/// Number of partitions [`PartitionEnumerator`] yields for `n` players and a
/// first team of `k`
pub fn partition_count(n: usize, k: usize) -> usize {
    if k == 0 || k >= n {
        return 0;
    }
    let total = binomial(n, k);
    if k * 2 == n {
        total / 2
    } else {
        total
    }
}

fn binomial(n: usize, k: usize) -> usize {
    let k = k.min(n - k);
    (0..k).fold(1u128, |acc, i| acc * (n - i) as u128 / (i + 1) as u128) as usize
}

/// Lazy iterator over every distinct split of a pool into a team of
/// `team_size` players and a team of the rest.
///
/// Team 0 is always the side holding the first pool entry and members keep
/// pool order. When both sides have the same size each split is yielded once.
#[derive(Debug)]
pub struct PartitionEnumerator<'a> {
    players: &'a [Player],
    team_size: usize,
    indices: Vec<usize>,
    symmetric: bool,
    exhausted: bool,
}

impl<'a> PartitionEnumerator<'a> {
    pub fn new(players: &'a [Player], team_size: usize) -> Self {
        let n = players.len();
        Self {
            players,
            team_size,
            indices: (0..team_size).collect(),
            symmetric: team_size * 2 == n,
            exhausted: team_size == 0 || team_size >= n,
        }
    }

    fn build(&self) -> Partition {
        let mut chosen = vec![false; self.players.len()];
        for &index in &self.indices {
            chosen[index] = true;
        }

        let (mut picked, mut rest) = (Vec::new(), Vec::new());
        for (player, &in_combo) in self.players.iter().zip(&chosen) {
            if in_combo {
                picked.push(player.clone());
            } else {
                rest.push(player.clone());
            }
        }

        if chosen[0] {
            Partition::from_teams(vec![picked, rest])
        } else {
            Partition::from_teams(vec![rest, picked])
        }
    }

    fn advance(&mut self) {
        let n = self.players.len();
        let k = self.team_size;

        let mut i = k;
        while i > 0 {
            i -= 1;
            if self.indices[i] < n - k + i {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return;
            }
        }
        self.exhausted = true;
    }
}

impl Iterator for PartitionEnumerator<'_> {
    type Item = Partition;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        // Combinations come in lexicographic order, so the mirrored half
        // starts at the first one without index 0
        if self.symmetric && self.indices[0] != 0 {
            self.exhausted = true;
            return None;
        }

        let partition = self.build();
        self.advance();
        Some(partition)
    }
}
