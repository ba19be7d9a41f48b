// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for SMART text extraction.
//!
//! Measures rule application over typical `smartctl -a` output and a full
//! orchestrated collection of a 24-bay shelf against canned command output,
//! which is the per-run CPU cost once the tools have answered.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use diskhealthlib::discovery::pool::PoolMap;
use diskhealthlib::exec::mock::MockRunner;
use diskhealthlib::smart::rules;
use diskhealthlib::{Deadline, Disk, Orchestrator};

const NVME_REPORT: &str = "\
Model Number:                       INTEL SSDPE2KX040T8
Warning  Comp. Temp. Threshold:     70 Celsius
Critical Comp. Temp. Threshold:     80 Celsius
Temperature:                        36 Celsius
Available Spare:                    100%
Percentage Used:                    2%
Data Units Read:                    4,193,342 [2.14 TB]
Data Units Written:                 9,876,543 [5.05 TB]
Power Cycles:                       1,187
Power On Hours:                     23,615
Media and Data Integrity Errors:    0";

const SAS_REPORT: &str = "\
Current Drive Temperature:     38 C
Drive Trip Temperature:        60 C
  number of hours powered up = 41234.55
Accumulated start-stop cycles:  52

Error counter log:
read:   12345678       12         0  12345690         12      91234.567           2
write:         0        0         0         0          0      45678.901           0

Non-medium error count:        0
Total uncorrected errors:       2";

fn bench_rules(c: &mut Criterion) {
    c.bench_function("nvme_rules", |b| {
        b.iter(|| rules::apply(&rules::NVME_RULES, NVME_REPORT));
    });

    c.bench_function("sas_rules", |b| {
        b.iter(|| {
            let mut attrs = rules::apply(&rules::SAS_RULES, SAS_REPORT);
            if let Some(section) = rules::error_counter_section(SAS_REPORT) {
                attrs.extend(rules::apply(&rules::SAS_COUNTER_RULES, section));
            }
            attrs
        });
    });
}

fn bench_orchestrator(c: &mut Criterion) {
    let names: Vec<String> = (0..24).map(|i| format!("sd{}", (b'a' + i as u8) as char)).collect();
    let runner = names.iter().fold(MockRunner::new(), |r, name| {
        r.with_output(format!("smartctl -H /dev/{}", name), "SMART Health Status: OK")
            .with_output(format!("smartctl -a /dev/{}", name), SAS_REPORT)
    });
    let orchestrator = Orchestrator::new(Arc::new(runner), 5);
    let pools: PoolMap = names.iter().map(|n| (n.clone(), "tank".to_string())).collect();

    c.bench_function("orchestrate_24_disks", |b| {
        b.iter(|| {
            let disks = names.iter().map(|n| Disk::new(n.as_str(), "HDD", "ST16000NM002G", "14.55 TB")).collect();
            orchestrator.collect(disks, &pools, &Deadline::none())
        });
    });
}

criterion_group!(benches, bench_rules, bench_orchestrator);
criterion_main!(benches);
