//! Synthetic benchmark workload generation.
//!
//! The generator is deliberately tiny and deterministic: a 32-bit
//! linear congruential generator drives a 70/20/10 get/set/del mix over
//! a bounded keyspace, so two runs issue the identical request
//! sequence. The LCG stays hand-rolled rather than pulled from a
//! randomness crate because the exact constants and sequence are part
//! of the workload contract.

use std::time::Duration;

/// Default generator seed.
pub const DEFAULT_SEED: u32 = 0x9e37_79b9;

/// Share of requests that are lookups.
const GET_PERCENT: u32 = 70;
/// Lookups plus stores; the remainder are deletes.
const SET_PERCENT: u32 = 20;

/// 32-bit linear congruential generator (Numerical Recipes constants).
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Lcg { state: seed }
    }

    /// Advance the generator and return the new state.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        self.state
    }
}

/// Operation categories in the benchmark mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Set,
    Del,
}

impl Op {
    /// Map a `% 100` bucket draw onto the mix: 70% get, 20% set,
    /// 10% del.
    pub fn from_bucket(bucket: u32) -> Op {
        if bucket < GET_PERCENT {
            Op::Get
        } else if bucket < GET_PERCENT + SET_PERCENT {
            Op::Set
        } else {
            Op::Del
        }
    }
}

/// One generated request against the keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { key: String },
    Set { key: String, value: String },
    Del { key: String },
}

impl Request {
    pub fn op(&self) -> Op {
        match self {
            Request::Get { .. } => Op::Get,
            Request::Set { .. } => Op::Set,
            Request::Del { .. } => Op::Del,
        }
    }

    /// Wire body for this request.
    pub fn body(&self) -> String {
        match self {
            Request::Get { key } => format!("get:{key}"),
            Request::Set { key, value } => format!("set:{key}:{value}"),
            Request::Del { key } => format!("del:{key}"),
        }
    }
}

/// Draws requests from the LCG over a bounded keyspace.
#[derive(Debug)]
pub struct Workload {
    rng: Lcg,
    keyspace: u32,
}

impl Workload {
    /// `keyspace` is the number of distinct keys and must be non-zero.
    pub fn new(seed: u32, keyspace: u32) -> Self {
        assert!(keyspace > 0, "keyspace must be non-zero");
        Workload {
            rng: Lcg::new(seed),
            keyspace,
        }
    }

    /// Key-value pairs used to warm up the keyspace: `k0..` mapped to
    /// `v0..`, so lookups have a hit rate from the first request.
    pub fn populate_pairs(&self) -> impl Iterator<Item = (String, String)> {
        (0..self.keyspace).map(|i| (format!("k{i}"), format!("v{i}")))
    }

    /// Draw the next request. Two generator steps per draw: one for the
    /// op bucket, one for the key id; store values fold the second
    /// state in so overwrites are visible.
    pub fn next_request(&mut self) -> Request {
        let bucket = self.rng.next_u32() % 100;
        let state = self.rng.next_u32();
        let key_id = state % self.keyspace;
        let key = format!("k{key_id}");

        match Op::from_bucket(bucket) {
            Op::Get => Request::Get { key },
            Op::Set => Request::Set {
                key,
                value: format!("v{}", key_id ^ state),
            },
            Op::Del => Request::Del { key },
        }
    }
}

/// Accumulated latency for one operation category.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatencyStat {
    count: u64,
    total: Duration,
}

impl LatencyStat {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean latency in microseconds.
    pub fn mean_us(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_nanos() as f64 / self.count as f64 / 1_000.0
    }
}

/// Per-category stats plus the failure tally for one benchmark run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub get: LatencyStat,
    pub set: LatencyStat,
    pub del: LatencyStat,
    pub failures: u64,
}

impl RunStats {
    pub fn stat_mut(&mut self, op: Op) -> &mut LatencyStat {
        match op {
            Op::Get => &mut self.get,
            Op::Set => &mut self.set,
            Op::Del => &mut self.del,
        }
    }

    /// Render the results block printed at the end of a run.
    pub fn report(&self, requests: u64, elapsed: Duration) -> String {
        let seconds = elapsed.as_secs_f64();
        let rps = if seconds > 0.0 {
            requests as f64 / seconds
        } else {
            0.0
        };

        let mut out = String::new();
        out.push_str("Results\n");
        out.push_str(&format!("  Total time: {seconds:.3} s\n"));
        out.push_str(&format!("  Throughput: {rps:.0} ops/s\n"));
        out.push_str(&format!("  Failures: {}\n", self.failures));
        for (name, stat) in [("GET", &self.get), ("SET", &self.set), ("DEL", &self.del)] {
            if stat.count() > 0 {
                out.push_str(&format!(
                    "  {name} avg: {:.3} us ({} ops)\n",
                    stat.mean_us(),
                    stat.count()
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_recurrence() {
        let mut lcg = Lcg::new(7);
        let expected = 7u32.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        assert_eq!(lcg.next_u32(), expected);
    }

    #[test]
    fn test_lcg_is_deterministic() {
        let mut a = Lcg::new(DEFAULT_SEED);
        let mut b = Lcg::new(DEFAULT_SEED);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(Op::from_bucket(0), Op::Get);
        assert_eq!(Op::from_bucket(69), Op::Get);
        assert_eq!(Op::from_bucket(70), Op::Set);
        assert_eq!(Op::from_bucket(89), Op::Set);
        assert_eq!(Op::from_bucket(90), Op::Del);
        assert_eq!(Op::from_bucket(99), Op::Del);
    }

    #[test]
    fn test_workload_is_deterministic() {
        let mut a = Workload::new(DEFAULT_SEED, 64);
        let mut b = Workload::new(DEFAULT_SEED, 64);
        for _ in 0..200 {
            assert_eq!(a.next_request(), b.next_request());
        }
    }

    #[test]
    fn test_requests_stay_in_keyspace() {
        let mut workload = Workload::new(DEFAULT_SEED, 4);
        for _ in 0..100 {
            let request = workload.next_request();
            let key = match &request {
                Request::Get { key } | Request::Set { key, .. } | Request::Del { key } => key,
            };
            let id: u32 = key.strip_prefix('k').unwrap().parse().unwrap();
            assert!(id < 4);
        }
    }

    #[test]
    fn test_mix_roughly_matches_ratios() {
        let mut workload = Workload::new(DEFAULT_SEED, 64);
        let mut stats = RunStats::default();
        let draws = 10_000;
        for _ in 0..draws {
            stats
                .stat_mut(workload.next_request().op())
                .record(Duration::ZERO);
        }
        let gets = stats.get.count() as f64 / draws as f64;
        let sets = stats.set.count() as f64 / draws as f64;
        let dels = stats.del.count() as f64 / draws as f64;
        assert!((0.65..0.75).contains(&gets), "get share {gets}");
        assert!((0.15..0.25).contains(&sets), "set share {sets}");
        assert!((0.05..0.15).contains(&dels), "del share {dels}");
    }

    #[test]
    fn test_populate_pairs() {
        let workload = Workload::new(DEFAULT_SEED, 3);
        let pairs: Vec<_> = workload.populate_pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("k0".to_string(), "v0".to_string()),
                ("k1".to_string(), "v1".to_string()),
                ("k2".to_string(), "v2".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_body_format() {
        let get = Request::Get { key: "k1".into() };
        let set = Request::Set {
            key: "k1".into(),
            value: "v9".into(),
        };
        let del = Request::Del { key: "k1".into() };
        assert_eq!(get.body(), "get:k1");
        assert_eq!(set.body(), "set:k1:v9");
        assert_eq!(del.body(), "del:k1");
    }

    #[test]
    fn test_latency_stat_mean() {
        let mut stat = LatencyStat::default();
        assert_eq!(stat.mean_us(), 0.0);
        stat.record(Duration::from_micros(10));
        stat.record(Duration::from_micros(20));
        assert_eq!(stat.count(), 2);
        assert!((stat.mean_us() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_contents() {
        let mut stats = RunStats::default();
        stats.get.record(Duration::from_micros(5));
        let report = stats.report(1, Duration::from_secs(1));
        assert!(report.contains("Failures: 0"));
        assert!(report.contains("GET avg:"));
        assert!(!report.contains("SET avg:"));
    }
}
