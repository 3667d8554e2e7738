/// The C8 "algorithm" component (§4.2 point 2): derives the comparable score
/// for one completed iteration from its stat-tracker payload.
///
/// The scheduler core (C6) never interprets `stat_tracker_payload` — it is
/// opaque, byte-exact cargo as far as the wire codec and C6 are concerned
/// (§4.3 "Opaque payloads"). The controller is the one place allowed to look
/// inside it, since §4.2 point 2 requires "the algorithm inspects the
/// child's statistics" to pick a winner. The load-generation client is
/// expected to write its primary throughput metric as a big-endian `f64` in
/// the first eight bytes of the payload; anything shorter (an aborted
/// iteration with no stats) scores `NEG_INFINITY` so it never wins.
pub fn score_from_stat_payload(payload: &[u8]) -> f64 {
    payload
        .get(0..8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(f64::from_be_bytes)
        .unwrap_or(f64::NEG_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_leading_eight_bytes_as_big_endian_f64() {
        let payload = 42.5f64.to_be_bytes().to_vec();
        assert_eq!(score_from_stat_payload(&payload), 42.5);
    }

    #[test]
    fn trailing_bytes_beyond_the_metric_are_ignored() {
        let mut payload = 7.0f64.to_be_bytes().to_vec();
        payload.extend_from_slice(b"extra stat blob");
        assert_eq!(score_from_stat_payload(&payload), 7.0);
    }

    #[test]
    fn short_payload_scores_negative_infinity() {
        assert_eq!(score_from_stat_payload(&[1, 2, 3]), f64::NEG_INFINITY);
    }

    #[test]
    fn empty_payload_scores_negative_infinity() {
        assert_eq!(score_from_stat_payload(&[]), f64::NEG_INFINITY);
    }
}
