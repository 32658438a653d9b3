//! Push key generation.
//!
//! Keys are 20 characters: 8 encode the millisecond timestamp, 12 are
//! random. Keys generated within the same millisecond reuse the random part
//! incremented by one, so keys sort in creation order.

use chrono::Utc;
use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Generates chronologically sortable push keys
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_time: i64,
    last_random: [u8; 12],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next key for the current time
    pub fn next_id(&mut self) -> String {
        self.next_id_at(Utc::now().timestamp_millis())
    }

    fn next_id_at(&mut self, now: i64) -> String {
        let duplicate = now == self.last_time;
        self.last_time = now;

        let mut id = String::with_capacity(20);
        let mut time = now;
        let mut time_chars = [0u8; 8];
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(time.rem_euclid(64)) as usize];
            time = time.div_euclid(64);
        }
        id.extend(time_chars.iter().map(|&c| c as char));

        if duplicate {
            for digit in self.last_random.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::thread_rng();
            for digit in self.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }
        id.extend(self.last_random.iter().map(|&d| PUSH_CHARS[d as usize] as char));

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_alphabet() {
        let mut generator = PushIdGenerator::new();
        let id = generator.next_id();
        assert_eq!(id.len(), 20);
        assert!(id.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn test_same_millisecond_keys_increase() {
        let mut generator = PushIdGenerator::new();
        let ids: Vec<String> = (0..50).map(|_| generator.next_id_at(1_700_000_000_000)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        sorted.dedup();
        assert_eq!(sorted.len(), 50);
    }

    #[test]
    fn test_later_time_sorts_after() {
        let mut generator = PushIdGenerator::new();
        let early = generator.next_id_at(1_000);
        let late = generator.next_id_at(2_000);
        assert!(early < late);
    }
}
