//! Palette filtering and catalog merge over realistic list sizes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use factory_sync::catalog::merge_tagged;
use factory_sync::palette::{build_index, filter};
use factory_sync::types::{Project, ProjectStatus, SkillInfo};

fn projects(count: usize) -> Vec<Project> {
    (0..count)
        .map(|i| Project {
            id: format!("p{}", i),
            name: format!("Project {} Robotics", i),
            seed_prompt: String::new(),
            output_dir: String::new(),
            created_at: String::new(),
            last_active_at: String::new(),
            status: ProjectStatus::Stopped,
            agent_count: 4,
            cycle_count: 0,
        })
        .collect()
}

fn skills(prefix: &str, count: usize) -> Vec<SkillInfo> {
    (0..count)
        .map(|i| SkillInfo {
            id: format!("{}-{}", prefix, i),
            name: format!("Skill {}", i),
            category: "engineering".to_string(),
            description: String::new(),
            content_preview: String::new(),
            tags: vec![],
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("palette_filter");
    for count in [10usize, 100, 1000] {
        let items = build_index(&projects(count));
        group.bench_with_input(BenchmarkId::new("query", count), &items, |b, items| {
            b.iter(|| filter(black_box(items), black_box("robot")))
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_merge");
    for count in [10usize, 100, 1000] {
        let base = skills("base", count);
        // Half the custom ids collide with base ids
        let mut custom = skills("custom", count / 2);
        custom.extend(skills("base", count / 2));
        group.bench_with_input(
            BenchmarkId::new("merge_tagged", count),
            &(base, custom),
            |b, (base, custom)| b.iter(|| merge_tagged(black_box(base), black_box(custom))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_filter, bench_merge);
criterion_main!(benches);
