/**
 * Schedule Routes
 * Tax-deadline list plus the month calendar and day detail
 */
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{schedule_day, CalendarView, DayDetail, MonthGrid, YearMonth};
use crate::crud::Editable;
use crate::error::{AppError, AppResult};
use crate::models::Schedule;
use crate::pagination::load_all;
use crate::routes::{labeled, Labeled};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMonthResponse {
    #[serde(flatten)]
    pub grid: MonthGrid,
    pub year_options: Vec<i32>,
}

/// Every schedule, bucketed by local start date, with the cursor on `today`.
async fn calendar(state: &AppState) -> AppResult<(CalendarView<Schedule>, NaiveDate)> {
    let tz = state.tz();
    let today = Utc::now().with_timezone(&tz).date_naive();
    let schedules = load_all::<Schedule>(state.store.as_ref(), Schedule::ORDER).await?;
    let view = CalendarView::new(&schedules, move |s: &Schedule| schedule_day(s, tz), today);
    Ok((view, today))
}

fn show_month(view: &mut CalendarView<Schedule>, target: YearMonth) {
    view.select_year(target.year);
    view.select_month(target.month);
}

fn year_month(year: i32, month: u32) -> AppResult<YearMonth> {
    YearMonth::new(year, month)
        .ok_or_else(|| AppError::BadRequest(format!("{}-{} is not a valid month", year, month)))
}

/// GET /api/schedules
/// All schedules ascending by start date.
pub async fn list_schedules(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Labeled<Schedule>>>> {
    let schedules = load_all::<Schedule>(state.store.as_ref(), Schedule::ORDER).await?;
    Ok(Json(
        schedules
            .into_iter()
            .map(|schedule| labeled(schedule, &state))
            .collect(),
    ))
}

/// GET /api/schedules/calendar?year=&month=
/// Defaults to the current month in the site time zone.
pub async fn calendar_month(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> AppResult<Json<CalendarMonthResponse>> {
    let (mut view, today) = calendar(&state).await?;
    if query.year.is_some() || query.month.is_some() {
        let target = year_month(
            query.year.unwrap_or(view.cursor().year),
            query.month.unwrap_or(view.cursor().month),
        )?;
        show_month(&mut view, target);
    }

    Ok(Json(CalendarMonthResponse {
        grid: view.month_grid(today),
        year_options: view.year_options(),
    }))
}

/// GET /api/schedules/calendar/{year}/{month}/{day}
/// Only days with at least one schedule have a detail.
pub async fn calendar_day(
    State(state): State<AppState>,
    Path((year, month, day)): Path<(i32, u32, u32)>,
) -> AppResult<Json<DayDetail<Schedule>>> {
    let target = year_month(year, month)?;
    let (mut view, _) = calendar(&state).await?;
    show_month(&mut view, target);

    let detail = view.select_day(day).cloned();
    detail.map(Json).ok_or(AppError::NotFound("Schedule"))
}
