use criterion::{criterion_group, criterion_main, Criterion};
use cumulus_compiler::{CidrAllocator, Compiler, Ipv4Cidr};
use cumulus_provider::{bake_stack, MockBaker, StaticInventory};
use cumulus_schema::Stack;

fn baked_preset(name: &str) -> Stack {
    let preset = cumulus_schema::get_preset(name).unwrap();
    let mut stack = cumulus_schema::parse_stack_str(preset.stackfile)
        .unwrap()
        .normalize()
        .unwrap();
    bake_stack(&mut stack, &MockBaker::new()).unwrap();
    stack
}

fn bench_compile_presets(c: &mut Criterion) {
    let inventory = StaticInventory::default();
    for name in ["minimal", "web", "logging"] {
        let stack = baked_preset(name);
        c.bench_function(&format!("compile_{name}"), |b| {
            b.iter(|| Compiler::new(&inventory).compile(&stack).unwrap());
        });
    }
}

fn bench_normalize(c: &mut Criterion) {
    let manifest =
        cumulus_schema::parse_stack_str(cumulus_schema::get_preset("logging").unwrap().stackfile)
            .unwrap();
    c.bench_function("normalize_logging", |b| {
        b.iter(|| manifest.normalize().unwrap());
    });
}

fn bench_cidr_allocation(c: &mut Criterion) {
    let parent: Ipv4Cidr = "10.0.0.0/8".parse().unwrap();
    c.bench_function("cidr_carve_65536", |b| {
        b.iter(|| CidrAllocator::new(parent, 8).count());
    });
}

criterion_group!(
    benches,
    bench_compile_presets,
    bench_normalize,
    bench_cidr_allocation
);
criterion_main!(benches);
