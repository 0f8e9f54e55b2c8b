//! Gateway selection for outbound interconnections

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::registry::{Distribution, GatewayWeight, OutboundInterconnection};

/// Call attributes the hash policies key on
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallAttributes {
    #[serde(default)]
    pub callid: String,
    #[serde(default)]
    pub src_ip: String,
    #[serde(default)]
    pub destination_number: String,
}

/// Picks one gateway per call attempt.
///
/// Round-robin cursors are kept per interconnection for the life of the
/// selector.
#[derive(Debug, Default)]
pub struct GatewaySelector {
    cursors: Mutex<HashMap<String, usize>>,
}

impl GatewaySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, intcon: &OutboundInterconnection, call: &CallAttributes) -> Option<String> {
        self.select_with(intcon, call, &mut rand::thread_rng())
    }

    pub fn select_with<R: Rng + ?Sized>(
        &self,
        intcon: &OutboundInterconnection,
        call: &CallAttributes,
        rng: &mut R,
    ) -> Option<String> {
        let gateways = &intcon.gateways;
        if gateways.is_empty() {
            return None;
        }
        let index = match intcon.distribution {
            Distribution::WeightBased => weighted_index(gateways, rng)?,
            Distribution::RoundRobin => self.advance(&intcon.name, gateways.len()),
            Distribution::HashCallid => hash_index(&call.callid, gateways.len()),
            Distribution::HashSrcIp => hash_index(&call.src_ip, gateways.len()),
            Distribution::HashDestinationNumber => {
                hash_index(&call.destination_number, gateways.len())
            }
        };
        gateways.get(index).map(|g| g.name.clone())
    }

    fn advance(&self, intcon: &str, len: usize) -> usize {
        let Ok(mut cursors) = self.cursors.lock() else {
            return 0;
        };
        let cursor = cursors.entry(intcon.to_string()).or_insert(0);
        let index = *cursor % len;
        *cursor = (index + 1) % len;
        index
    }
}

/// Cumulative-weight draw; `None` when every weight is zero
pub fn weighted_index<R: Rng + ?Sized>(gateways: &[GatewayWeight], rng: &mut R) -> Option<usize> {
    let weights: Vec<u32> = gateways.iter().map(|g| g.weight).collect();
    pick_weighted(&weights, rng)
}

/// Cumulative-weight draw over bare weights
pub fn pick_weighted<R: Rng + ?Sized>(weights: &[u32], rng: &mut R) -> Option<usize> {
    let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
    if total == 0 {
        return None;
    }
    let mut point = rng.gen_range(0..total);
    for (index, weight) in weights.iter().enumerate() {
        let weight = u64::from(*weight);
        if point < weight {
            return Some(index);
        }
        point -= weight;
    }
    None
}

/// Stable index for `key`: the same key maps to the same slot while `len`
/// is unchanged
pub fn hash_index(key: &str, len: usize) -> usize {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % len as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn intcon(distribution: Distribution, weights: &[u32]) -> OutboundInterconnection {
        OutboundInterconnection {
            name: "carrier".into(),
            desc: String::new(),
            sipprofile: "external".into(),
            distribution,
            gateways: weights
                .iter()
                .enumerate()
                .map(|(i, w)| GatewayWeight {
                    name: format!("gw{}", i + 1),
                    weight: *w,
                })
                .collect(),
            rtp_nets: vec![],
            codec_class: "std".into(),
            capacity_class: "cap".into(),
            translation_classes: vec![],
            manipulation_classes: vec![],
            nodes: vec!["_ALL_".into()],
            enable: true,
        }
    }

    #[test]
    fn test_round_robin_rotates() {
        let selector = GatewaySelector::new();
        let intcon = intcon(Distribution::RoundRobin, &[1, 1, 1]);
        let call = CallAttributes::default();
        let picks: Vec<String> = (0..6)
            .filter_map(|_| selector.select(&intcon, &call))
            .collect();
        assert_eq!(picks, vec!["gw1", "gw2", "gw3", "gw1", "gw2", "gw3"]);
    }

    #[test]
    fn test_hash_affinity() {
        let selector = GatewaySelector::new();
        let intcon = intcon(Distribution::HashDestinationNumber, &[1, 1, 1, 1]);
        let call = CallAttributes {
            destination_number: "442071234567".into(),
            ..Default::default()
        };
        let first = selector.select(&intcon, &call).unwrap();
        for _ in 0..20 {
            assert_eq!(selector.select(&intcon, &call).unwrap(), first);
        }
    }

    #[test]
    fn test_weighted_draw_follows_weights() {
        let selector = GatewaySelector::new();
        let intcon = intcon(Distribution::WeightBased, &[90, 10, 0]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 3];
        for _ in 0..2000 {
            let pick = selector
                .select_with(&intcon, &CallAttributes::default(), &mut rng)
                .unwrap();
            counts[pick.trim_start_matches("gw").parse::<usize>().unwrap() - 1] += 1;
        }
        assert_eq!(counts[2], 0);
        assert!(counts[0] > counts[1] * 4);
    }

    #[test]
    fn test_zero_weights_select_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_weighted(&[0, 0], &mut rng), None);
        assert_eq!(pick_weighted(&[], &mut rng), None);
        assert_eq!(pick_weighted(&[0, 5], &mut rng), Some(1));
    }

    #[test]
    fn test_hash_index_in_range() {
        for key in ["", "a", "10.0.0.1", "callid-xyz"] {
            assert!(hash_index(key, 3) < 3);
        }
    }
}
