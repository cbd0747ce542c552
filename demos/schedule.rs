use chrono::{Duration, Utc};
use morphcards::{
    Card, CardState, MemoryState, Parameters, Rating, Scheduler, SchedulerConfig,
};

fn schedule_new_card(scheduler: &Scheduler) -> Result<(), Box<dyn std::error::Error>> {
    // A card nobody has reviewed yet
    let now = Utc::now();
    let card = Card::new("casa", "La casa es grande.", now);

    let next_states = scheduler.preview(&card, now)?;
    println!("Again interval: {:.1} days", next_states.again.interval);
    println!("Hard interval: {:.1} days", next_states.hard.interval);
    println!("Good interval: {:.1} days", next_states.good.interval);
    println!("Easy interval: {:.1} days", next_states.easy.interval);

    // The learner answered `good`
    let mut tracker = scheduler.new_tracker();
    let outcome = scheduler.review(&card, Rating::Good, now, &mut tracker)?;
    println!("Next review due: {}", outcome.card.due);
    println!("Memory state: {:?}", outcome.card.state);
    println!("Review log: {:?}", outcome.log);
    Ok(())
}

fn schedule_existing_card(scheduler: &Scheduler) -> Result<(), Box<dyn std::error::Error>> {
    // Reviewed a week ago with a one-week stability
    let now = Utc::now();
    let mut card = Card::new("perro", "El perro ladra.", now - Duration::days(30));
    card.state = CardState::Review(MemoryState {
        stability: 7.0,
        difficulty: 5.0,
    });
    card.last_reviewed = Some(now - Duration::days(7));
    card.due = now;
    card.review_count = 3;

    if let Some(r) = card.retrievability(now) {
        println!("Recall probability today: {r:.3}");
    }
    let (card, log) = scheduler.next_state(&card, Rating::Again, now)?;
    println!("After a lapse: {:?}, next in {:.1} days", card.state, log.scheduled_days);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = Scheduler::new(Parameters::default(), SchedulerConfig::default())?;
    println!("Scheduling a new card:");
    schedule_new_card(&scheduler)?;
    println!("\nScheduling an existing card:");
    schedule_existing_card(&scheduler)?;
    Ok(())
}
