use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::floating_type_mod::FT;

#[derive(Clone)]
pub struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}
impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }
    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }
    pub fn values(&self) -> &[T] {
        &self.values
    }
}
impl Counter<FT> {
    pub fn avg(&self) -> FT {
        if self.values.is_empty() {
            return 0.;
        }
        self.values.iter().cloned().sum::<FT>() / self.values.len() as FT
    }
    pub fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::MAX, FT::min)
    }
    pub fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::MIN, FT::max)
    }
}
impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    pub fn avg(&self) -> Duration {
        if self.values.is_empty() {
            return Duration::ZERO;
        }
        self.values.iter().cloned().sum::<Duration>() / self.values.len() as u32
    }

    pub fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

pub struct ValueCounters {
    pub counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}
impl ValueCounters {
    pub fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    pub fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }
}

pub struct PerformanceCounters {
    pub counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}
impl PerformanceCounters {
    pub fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    pub fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }
    pub fn end(&mut self, id: &str) {
        if self.enabled {
            if let Some(counter) = self.counters.get_mut(id) {
                counter.end();
            }
        }
    }
}

pub fn write_statistics(pcounters: &PerformanceCounters, vcounters: &ValueCounters) -> String {
    let mut s = String::new();

    if let Some(step) = pcounters.counters.get("simulation-step") {
        let _ = writeln!(s, "simulation-time: {}ms", step.sum().as_secs_f64() * 1000.);
        let _ = writeln!(s);
    }

    let mut v = pcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, pcounter) in v {
        let _ = writeln!(s, "{}: avg:{}ms", label, pcounter.avg().as_secs_f64() * 1000.);
    }
    let _ = writeln!(s);

    let mut v = vcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, vcounter) in v {
        let _ = writeln!(
            s,
            "{}: min:{} max:{} avg:{}",
            label,
            vcounter.min(),
            vcounter.max(),
            vcounter.avg()
        );
    }

    s
}

#[test]
fn disabled_counters_record_nothing() {
    let mut vcounters = ValueCounters::new(false);
    vcounters.add_value("x", 1.);
    assert!(vcounters.counters.is_empty());

    let mut pcounters = PerformanceCounters::new(false);
    pcounters.begin("step");
    pcounters.end("step");
    assert!(pcounters.counters.is_empty());
}

#[test]
fn statistics_summary_lists_counters() {
    let mut vcounters = ValueCounters::new(true);
    vcounters.add_value("avg-density-error", 0.5);
    vcounters.add_value("avg-density-error", 0.25);
    let counter = &vcounters.counters["avg-density-error"];
    assert_eq!(counter.min(), 0.25);
    assert_eq!(counter.max(), 0.5);
    assert_eq!(counter.avg(), 0.375);

    let mut pcounters = PerformanceCounters::new(true);
    pcounters.begin("simulation-step");
    pcounters.end("simulation-step");

    let s = write_statistics(&pcounters, &vcounters);
    assert!(s.contains("simulation-time"));
    assert!(s.contains("avg-density-error: min:0.25 max:0.5 avg:0.375"));
}
