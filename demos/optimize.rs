use chrono::{Duration, NaiveDate, TimeZone, Utc};
use morphcards::{
    Card, DEFAULT_PARAMETERS, MorphCardsError, Optimizer, OptimizerConfig, Parameters, Rating,
    ReviewLog, Scheduler, SchedulerConfig, evaluate,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logs = create_review_logs()?;
    println!("Review logs: {}", logs.len());
    println!("Default parameters: {DEFAULT_PARAMETERS:?}");

    let config = OptimizerConfig::new().with_min_reviews(20);
    let optimizer = Optimizer::new(config, Parameters::default());
    let optimized = match optimizer.fit_with_progress(&logs, |progress| {
        println!(
            "iteration {}/{}: log loss {:.4}",
            progress.iteration, progress.max_iterations, progress.loss
        );
        true
    }) {
        Ok(parameters) => parameters,
        Err(MorphCardsError::NonConvergent { best, .. }) => {
            println!("Did not settle; using the best parameters seen");
            best
        }
        Err(e) => return Err(e.into()),
    };
    println!("Optimized parameters: {:?}", optimized.as_slice());
    println!("Before: {:?}", evaluate(&Parameters::default(), &logs)?);
    println!("After: {:?}", evaluate(&optimized, &logs)?);
    Ok(())
}

/// Rebuilds logs for a handful of cards from `(date, rating)` histories.
fn create_review_logs() -> Result<Vec<ReviewLog>, MorphCardsError> {
    let scheduler = Scheduler::new(Parameters::default(), SchedulerConfig::default())?;
    let mut logs = Vec::new();
    for (i, history) in card_histories().into_iter().enumerate() {
        let created = history[0].0.and_hms_opt(9, 0, 0).unwrap_or_default();
        let mut card = Card::new(format!("word{i}"), "", Utc.from_utc_datetime(&created));
        for (date, rating) in history {
            let at = Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap_or_default())
                + Duration::minutes(i as i64);
            let (next, log) = scheduler.next_state(&card, Rating::try_from(rating)?, at)?;
            card = next;
            logs.push(log);
        }
    }
    Ok(logs)
}

fn card_histories() -> Vec<Vec<(NaiveDate, u32)>> {
    let date = |m, d| NaiveDate::from_ymd_opt(2023, m, d).unwrap_or_default();
    vec![
        vec![(date(1, 1), 3), (date(1, 2), 4), (date(1, 5), 3), (date(1, 15), 4), (date(2, 1), 3), (date(2, 20), 4)],
        vec![(date(1, 1), 2), (date(1, 2), 3), (date(1, 4), 4), (date(1, 12), 3), (date(1, 28), 4), (date(2, 15), 3), (date(3, 5), 4)],
        vec![(date(1, 1), 4), (date(1, 8), 4), (date(1, 24), 3), (date(2, 10), 4), (date(3, 1), 3)],
        vec![(date(1, 1), 1), (date(1, 2), 1), (date(1, 3), 3), (date(1, 6), 4), (date(1, 16), 4), (date(2, 1), 3), (date(2, 20), 4)],
        vec![(date(1, 1), 3), (date(1, 3), 3), (date(1, 8), 2), (date(1, 10), 4), (date(1, 22), 3), (date(2, 5), 4), (date(2, 25), 3)],
        vec![(date(1, 1), 4), (date(1, 9), 3), (date(1, 19), 4), (date(2, 5), 3), (date(2, 25), 4)],
        vec![(date(1, 1), 2), (date(1, 2), 3), (date(1, 5), 4), (date(1, 15), 3), (date(1, 30), 4), (date(2, 15), 3), (date(3, 5), 4)],
        vec![(date(1, 1), 3), (date(1, 4), 1), (date(1, 5), 3), (date(1, 9), 3), (date(1, 20), 4), (date(2, 14), 3)],
    ]
}
