use bigdecimal::BigDecimal;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flexfit_admin::revenue::{find_overlaps, resolve_for_plan, CutOffChartEntry, FeeBasedCut, PlanDuration, PlanTier};
use flexfit_admin::templates::fill;
use uuid::Uuid;

fn chart() -> Vec<CutOffChartEntry> {
    let mut entries = Vec::new();
    for (i, tier) in PlanTier::ALL.iter().enumerate() {
        for duration in PlanDuration::ALL {
            let admin = BigDecimal::from(10 + 5 * i as i64);
            entries.push(CutOffChartEntry {
                chart_id: Uuid::new_v4(),
                tier: tier.as_str().to_string(),
                duration: duration.as_str().to_string(),
                gym_owner_cut_percentage: BigDecimal::from(100) - &admin,
                admin_cut_percentage: admin,
            });
        }
    }
    entries
}

fn fee_cuts(count: i64) -> Vec<FeeBasedCut> {
    (0..count)
        .map(|i| FeeBasedCut {
            cut_id: Uuid::new_v4(),
            price_range_start: BigDecimal::from(i * 1000),
            price_range_end: BigDecimal::from(i * 1000 + 999),
            admin_cut_percentage: BigDecimal::from(20),
            gym_cut_percentage: BigDecimal::from(80),
        })
        .collect()
}

fn revenue_benchmark(c: &mut Criterion) {
    let chart = chart();
    let fees = fee_cuts(50);
    let price: BigDecimal = "2499.50".parse().unwrap();
    let unmatched: BigDecimal = "99999.00".parse().unwrap();

    c.bench_function("resolve_fee_based", |b| {
        b.iter(|| resolve_for_plan(black_box(&price), "Tier 2", "Monthly", &fees, &chart))
    });
    c.bench_function("resolve_tier_fallback", |b| {
        b.iter(|| resolve_for_plan(black_box(&unmatched), "Tier 3", "Yearly", &fees, &chart))
    });
    c.bench_function("find_overlaps_50", |b| b.iter(|| find_overlaps(black_box(&fees))));
}

fn template_benchmark(c: &mut Criterion) {
    let rows: String = (0..200)
        .map(|i| format!("<tr><td>Member {}</td><td>active</td></tr>", i))
        .collect();
    let page = "<h1>{title}</h1>{flash}<table><tbody>{rows}</tbody></table><p>{count} members</p>";

    c.bench_function("fill_member_page", |b| {
        b.iter(|| {
            fill(
                black_box(page),
                &[
                    ("title", "Members".to_string()),
                    ("flash", String::new()),
                    ("rows", rows.clone()),
                    ("count", "200".to_string()),
                ],
            )
        })
    });
}

criterion_group!(benches, revenue_benchmark, template_benchmark);
criterion_main!(benches);
