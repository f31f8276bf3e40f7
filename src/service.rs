// The operations collaborators call. Each one is a load, a pure
// computation and a single versioned write, so a failure at any step
// leaves the stored review as it was.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::cycle::Performance;
use crate::dates::{self, Clock};
use crate::error::{Result, ReviewError};
use crate::reschedule::{Completion, Rescheduler};
use crate::review::{NewReview, Review, ReviewDetails, Suggestion};
use crate::store::ReviewStore;

pub struct ReviewService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    rescheduler: Rescheduler,
}

impl<S: ReviewStore> ReviewService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, rescheduler: Rescheduler) -> Self {
        ReviewService {
            store,
            clock,
            rescheduler,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn list_reviews(&self) -> Result<Vec<Review>> {
        self.store.get_all()
    }

    pub fn get_review(&self, id: &str) -> Result<Review> {
        self.store.get(id)
    }

    pub fn create_review(&mut self, new: NewReview) -> Result<Review> {
        let review = Review::create(new, self.clock.now())?;
        let review = self.store.insert(review)?;
        info!(id = %review.id, subject = %review.subject_id, topic = %review.topic, "created review");
        Ok(review)
    }

    /// Validates every entry before storing any, then stores them in one
    /// write.
    pub fn create_reviews(&mut self, new: Vec<NewReview>) -> Result<Vec<Review>> {
        let now = self.clock.now();
        let reviews = new
            .into_iter()
            .map(|n| Review::create(n, now))
            .collect::<Result<Vec<_>>>()?;
        let reviews = self.store.insert_many(reviews)?;
        info!(count = reviews.len(), "created reviews");
        Ok(reviews)
    }

    /// Records a finished cycle and moves the pending cycles after it
    /// according to `performance`.
    pub fn complete_cycle(
        &mut self,
        id: &str,
        cycle: i64,
        performance: i64,
        notes: Option<String>,
        suggestion: Option<Suggestion>,
    ) -> Result<Review> {
        let mut review = self.store.get(id)?;
        let completion = Completion {
            cycle,
            performance: Performance::new(performance)?,
            completed_at: self.clock.now(),
            notes: notes.filter(|n| !n.trim().is_empty()),
            suggestion,
        };
        review.cycles = self.rescheduler.reschedule(&review.cycles, &completion)?;
        let review = self.store.update_by_id(id, review)?;
        info!(id, cycle, performance, "completed cycle");
        Ok(review)
    }

    /// Moves a pending cycle to `new_date`'s day. The day must not come
    /// before the previous cycle's day or after the next one's. The stored
    /// instant is the start of that day, raised to the previous cycle's
    /// instant when both fall on the same day.
    pub fn edit_cycle_planned_date(
        &mut self,
        id: &str,
        cycle: i64,
        new_date: DateTime<Utc>,
    ) -> Result<Review> {
        let mut review = self.store.get(id)?;
        let target = review.cycles.get(cycle)?;
        if target.is_completed {
            return Err(ReviewError::AlreadyCompleted(target.cycle));
        }
        let number = target.cycle;
        let day = new_date.date_naive();
        let before = review.cycles.get(cycle - 1).ok().map(|c| c.planned_date);
        let after = review.cycles.get(cycle + 1).ok().map(|c| c.planned_date);
        let too_early = before.is_some_and(|d| d.date_naive() > day);
        let too_late = after.is_some_and(|d| d.date_naive() < day);
        if too_early || too_late {
            return Err(ReviewError::DateOutOfOrder { cycle: number, date: day });
        }

        let mut planned = dates::start_of_day(new_date);
        if let Some(before) = before
            && before > planned
        {
            planned = before;
        }
        review.cycles.get_mut(cycle)?.planned_date = planned;
        let review = self.store.update_by_id(id, review)?;
        info!(id, cycle, date = %day, "moved cycle");
        Ok(review)
    }

    /// Replaces the notes and suggestion of any cycle, completed or not.
    pub fn annotate_cycle(
        &mut self,
        id: &str,
        cycle: i64,
        notes: Option<String>,
        suggestion: Option<Suggestion>,
    ) -> Result<Review> {
        let mut review = self.store.get(id)?;
        let target = review.cycles.get_mut(cycle)?;
        target.notes = notes.filter(|n| !n.trim().is_empty());
        target.suggestion = suggestion;
        self.store.update_by_id(id, review)
    }

    pub fn update_details(&mut self, id: &str, details: ReviewDetails) -> Result<Review> {
        let mut review = self.store.get(id)?;
        review.apply_details(details)?;
        let review = self.store.update_by_id(id, review)?;
        info!(id, "updated review details");
        Ok(review)
    }

    pub fn delete_review(&mut self, id: &str) -> Result<()> {
        self.store.delete_by_id(id)?;
        info!(id, "deleted review");
        Ok(())
    }
}
