use criterion::{black_box, criterion_group, criterion_main, Criterion};
use condor_spec::{MatchSpec, PackageInfo, Version};

fn bench_version_parse(c: &mut Criterion) {
    let versions = [
        "1.2.3",
        "1.0rc1",
        "2!1.0.post1",
        "3.11.4",
        "1.26.0+local.7",
        "2023.09.1",
        "0.4.1.rc",
    ];

    c.bench_function("version_parse", |b| {
        b.iter(|| {
            for version in versions {
                black_box(Version::parse(black_box(version)).unwrap());
            }
        })
    });
}

fn bench_version_compare(c: &mut Criterion) {
    let pairs: Vec<(Version, Version)> = [
        ("1.2.3", "1.2.4"),
        ("1.0rc1", "1.0"),
        ("1.0", "1.0.0"),
        ("2!0.1", "1.9"),
        ("1.0dev", "1.0a1"),
    ]
    .iter()
    .map(|(a, b)| (Version::parse(a).unwrap(), Version::parse(b).unwrap()))
    .collect();

    c.bench_function("version_compare", |b| {
        b.iter(|| {
            for (left, right) in &pairs {
                black_box(black_box(left).cmp(black_box(right)));
            }
        })
    });
}

fn bench_match_spec_parse(c: &mut Criterion) {
    let specs = [
        "numpy",
        "numpy >=1.8,<2 py39*",
        "python=3.11",
        "conda-forge/linux-64::numpy[version='>=1.8', build_number='>=2']",
        "libblas 3.9.* *mkl",
    ];

    c.bench_function("match_spec_parse", |b| {
        b.iter(|| {
            for spec in specs {
                black_box(MatchSpec::parse(black_box(spec)).unwrap());
            }
        })
    });
}

fn bench_match_spec_matches(c: &mut Criterion) {
    let record = PackageInfo::new("numpy", Version::parse("1.26.0").unwrap(), "py311h64a7726_0")
        .with_channel("https://conda.anaconda.org/conda-forge")
        .with_build_number(0);
    let specs: Vec<MatchSpec> = [
        "numpy",
        "numpy >=1.8,<2 py311*",
        "conda-forge::numpy 1.26.*",
        "numpy <1.0|>=1.20",
    ]
    .iter()
    .map(|s| MatchSpec::parse(s).unwrap())
    .collect();

    c.bench_function("match_spec_matches", |b| {
        b.iter(|| {
            for spec in &specs {
                black_box(spec.matches(black_box(&record)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_version_parse,
    bench_version_compare,
    bench_match_spec_parse,
    bench_match_spec_matches
);
criterion_main!(benches);
