use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::agenda;
use crate::error::ReviewError;
use crate::review::{NewReview, Review, ReviewDetails, Suggestion};
use crate::service::ReviewService;
use crate::store::ReviewStore;

// -- App state --

pub type DynStore = Box<dyn ReviewStore + Send>;

pub struct AppState {
    pub service: ReviewService<DynStore>,
    pub days_ahead: i64,
}

pub type SharedState = Arc<Mutex<AppState>>;

// -- Errors --

impl ReviewError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReviewError::ReviewNotFound(_) | ReviewError::CycleNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ReviewError::AlreadyCompleted(_)
            | ReviewError::VersionConflict { .. }
            | ReviewError::DuplicateReview(_) => StatusCode::CONFLICT,
            ReviewError::InvalidPerformance(_)
            | ReviewError::DateOutOfOrder { .. }
            | ReviewError::InvalidReview(_)
            | ReviewError::Csv(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReviewError::StoreLocked(_) => StatusCode::SERVICE_UNAVAILABLE,
            ReviewError::Config(_) | ReviewError::Io(_) | ReviewError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ReviewError>;

// -- Request bodies --

#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub performance: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub suggestion: Option<Suggestion>,
}

#[derive(Debug, Deserialize)]
pub struct DateBody {
    pub date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NotesBody {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub suggestion: Option<Suggestion>,
}

// -- Route handlers --

pub async fn list_reviews(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Review>> {
    let st = state.lock().await;
    let mut reviews = st.service.list_reviews()?;
    if let Some(subject) = params.get("subject") {
        reviews.retain(|r| &r.subject_id == subject);
    }
    Ok(Json(reviews))
}

pub async fn create_review(
    State(state): State<SharedState>,
    Json(body): Json<NewReview>,
) -> Result<(StatusCode, Json<Review>), ReviewError> {
    let mut st = state.lock().await;
    let review = st.service.create_review(body)?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn get_review(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Review> {
    let st = state.lock().await;
    Ok(Json(st.service.get_review(&id)?))
}

pub async fn update_review(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<ReviewDetails>,
) -> ApiResult<Review> {
    let mut st = state.lock().await;
    Ok(Json(st.service.update_details(&id, body)?))
}

pub async fn delete_review(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ReviewError> {
    let mut st = state.lock().await;
    st.service.delete_review(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete_cycle(
    State(state): State<SharedState>,
    Path((id, cycle)): Path<(String, i64)>,
    Json(body): Json<CompleteBody>,
) -> ApiResult<Review> {
    let mut st = state.lock().await;
    let review = st
        .service
        .complete_cycle(&id, cycle, body.performance, body.notes, body.suggestion)?;
    Ok(Json(review))
}

pub async fn move_cycle(
    State(state): State<SharedState>,
    Path((id, cycle)): Path<(String, i64)>,
    Json(body): Json<DateBody>,
) -> ApiResult<Review> {
    let mut st = state.lock().await;
    Ok(Json(st.service.edit_cycle_planned_date(&id, cycle, body.date)?))
}

pub async fn annotate_cycle(
    State(state): State<SharedState>,
    Path((id, cycle)): Path<(String, i64)>,
    Json(body): Json<NotesBody>,
) -> ApiResult<Review> {
    let mut st = state.lock().await;
    Ok(Json(st.service.annotate_cycle(&id, cycle, body.notes, body.suggestion)?))
}

pub async fn subjects(State(state): State<SharedState>) -> ApiResult<Vec<agenda::SubjectGroup>> {
    let st = state.lock().await;
    let reviews = st.service.list_reviews()?;
    Ok(Json(agenda::group_by_subject(&reviews)))
}

pub async fn due(State(state): State<SharedState>) -> ApiResult<Vec<agenda::AgendaEntry>> {
    let st = state.lock().await;
    let reviews = st.service.list_reviews()?;
    Ok(Json(agenda::due_cycles(&reviews, st.service.now())))
}

pub async fn upcoming(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<agenda::SubjectAgenda>> {
    let st = state.lock().await;
    let days = match params.get("days") {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|d| (1..=365).contains(d))
            .ok_or_else(|| ReviewError::InvalidReview(format!("invalid days: {raw}")))?,
        None => st.days_ahead,
    };
    let reviews = st.service.list_reviews()?;
    Ok(Json(agenda::upcoming(&reviews, st.service.now(), days)))
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/reviews", get(list_reviews).post(create_review))
        .route(
            "/reviews/{id}",
            get(get_review).patch(update_review).delete(delete_review),
        )
        .route("/reviews/{id}/cycles/{cycle}/complete", post(complete_cycle))
        .route("/reviews/{id}/cycles/{cycle}/date", put(move_cycle))
        .route("/reviews/{id}/cycles/{cycle}/notes", put(annotate_cycle))
        .route("/subjects", get(subjects))
        .route("/due", get(due))
        .route("/agenda", get(upcoming))
        .with_state(state)
}

// -- Public entry point --

pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let app = router(Arc::new(Mutex::new(state)));
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("serving at http://localhost:{port}");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::FixedClock;
    use crate::reschedule::Rescheduler;
    use crate::review::Priority;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn state_at(now: DateTime<Utc>) -> SharedState {
        let store: DynStore = Box::new(MemoryStore::new());
        Arc::new(Mutex::new(AppState {
            service: ReviewService::new(store, Arc::new(FixedClock(now)), Rescheduler::default()),
            days_ahead: 7,
        }))
    }

    fn new_review(subject: &str, topic: &str) -> NewReview {
        NewReview {
            subject_id: subject.into(),
            topic: topic.into(),
            priority: Priority::Low,
            suggestion: None,
            general_notes: None,
        }
    }

    #[tokio::test]
    async fn create_and_complete() {
        let state = state_at(day(2026, 1, 1));
        let (status, Json(review)) =
            create_review(State(state.clone()), Json(new_review("math", "Limits")))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(done) = complete_cycle(
            State(state.clone()),
            Path((review.id.clone(), 1)),
            Json(CompleteBody {
                performance: 40,
                notes: None,
                suggestion: Some(Suggestion::Theory),
            }),
        )
        .await
        .unwrap();
        assert!(done.cycles.get(1).unwrap().is_completed);
        assert_eq!(done.cycles.get(2).unwrap().planned_date, day(2026, 1, 5));

        let err = complete_cycle(
            State(state),
            Path((review.id, 1)),
            Json(CompleteBody {
                performance: 90,
                notes: None,
                suggestion: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn list_filters_by_subject() {
        let state = state_at(day(2026, 1, 1));
        for (subject, topic) in [("math", "Limits"), ("bio", "Cells"), ("math", "Series")] {
            create_review(State(state.clone()), Json(new_review(subject, topic)))
                .await
                .unwrap();
        }
        let params = HashMap::from([("subject".to_string(), "math".to_string())]);
        let Json(reviews) = list_reviews(State(state.clone()), Query(params))
            .await
            .unwrap();
        assert_eq!(reviews.len(), 2);

        let Json(groups) = subjects(State(state)).await.unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[tokio::test]
    async fn agenda_validates_days() {
        let state = state_at(day(2026, 1, 1));
        create_review(State(state.clone()), Json(new_review("math", "Limits")))
            .await
            .unwrap();

        let Json(agenda) = upcoming(State(state.clone()), Query(HashMap::new()))
            .await
            .unwrap();
        assert_eq!(agenda.len(), 1);
        assert_eq!(agenda[0].entries.len(), 1);

        let params = HashMap::from([("days".to_string(), "zero".to_string())]);
        let err = upcoming(State(state), Query(params)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn missing_review_is_404() {
        let state = state_at(day(2026, 1, 1));
        let err = get_review(State(state.clone()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = delete_review(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ReviewError::InvalidPerformance(120).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ReviewError::CycleNotFound(5).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ReviewError::VersionConflict {
                id: "x".into(),
                expected: 1,
                found: 2
            }
            .status(),
            StatusCode::CONFLICT
        );
    }
}
