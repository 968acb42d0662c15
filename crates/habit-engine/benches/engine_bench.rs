use chrono::{Days, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use habit_core::{BloodPressure, DailyInput, ProgressionState};

fn build_history(days: u64) -> (ProgressionState, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let input = DailyInput {
        meds_taken: true,
        junk_score: 8,
        sleep_hours: 7,
        slept_past_midnight: false,
        moved: true,
        blood_pressure: Some(BloodPressure {
            systolic: 118,
            diastolic: 74,
        }),
    };
    let mut state = ProgressionState::default();
    let mut date = start;
    for _ in 0..days {
        let (next, _) = habit_engine::apply_log_entry(&state, &input, date, date).unwrap();
        state = next;
        date = date + Days::new(1);
    }
    (state, date)
}

fn bench_reducer(c: &mut Criterion) {
    let (state, today) = build_history(365);
    let input = DailyInput {
        meds_taken: true,
        junk_score: 10,
        sleep_hours: 8,
        slept_past_midnight: false,
        moved: true,
        blood_pressure: Some(BloodPressure {
            systolic: 110,
            diastolic: 70,
        }),
    };
    c.bench_function("apply_log_entry over 1y history", |b| {
        b.iter(|| {
            let out = habit_engine::apply_log_entry(&state, &input, today, today).unwrap();
            black_box(out);
        })
    });
}

criterion_group!(benches, bench_reducer);
criterion_main!(benches);
