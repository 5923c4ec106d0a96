/**
 * Site Routes
 * Static firm content for the home, company and location pages
 */
use std::str::FromStr;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::analytics::PageView;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const FIRM_NAME: &str = "세무법인 택스인";
const PHONE: &str = "031-206-7676";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteSection {
    Home,
    Company,
    Location,
}

impl FromStr for SiteSection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(SiteSection::Home),
            "company" => Ok(SiteSection::Company),
            "location" => Ok(SiteSection::Location),
            _ => Err(AppError::NotFound("Section")),
        }
    }
}

impl SiteSection {
    /// Page path recorded for analytics
    pub fn page(&self) -> &'static str {
        match self {
            SiteSection::Home => "/",
            SiteSection::Company => "/company",
            SiteSection::Location => "/location",
        }
    }

    pub fn content(&self) -> Value {
        match self {
            SiteSection::Home => json!({
                "firmName": FIRM_NAME,
                "slides": [
                    "35년 이상의 경력을 가진 전문 세무사",
                    "현장 경험을 바탕으로 빠른 세무 문제 해결",
                    "고객 별 최적의 맞춤형 세무 서비스 제공",
                    "세무 관리 부문 최고의 파트너"
                ],
                "values": [
                    { "title": "신뢰성", "description": "국세청 35년 경력을 바탕으로 한 정확한 세무 처리" },
                    { "title": "전문성", "description": "조사, 송무, 체납 등 핵심 부서 경험" },
                    { "title": "맞춤성", "description": "고객 상황에 맞춘 세무 서비스" }
                ],
                "phone": PHONE
            }),
            SiteSection::Company => json!({
                "firmName": FIRM_NAME,
                "representative": {
                    "name": "장혁배",
                    "title": "대표세무사",
                    "career": [
                        { "heading": "국세청 35년 근무", "items": [] },
                        {
                            "heading": "주요 보직",
                            "items": [
                                "동안양세무서 납세자보호담당관",
                                "성남세무서 조사과장",
                                "분당세무서 부가가치세과장",
                                "경기광주세무서 재산법인세과장"
                            ]
                        },
                        {
                            "heading": "국세청 핵심부서 근무",
                            "items": [
                                "중부지방국세청 체납추적팀장",
                                "국세청 심사2과",
                                "중부지방국세청 송무과",
                                "중부지방국세청 조사1국, 조사3국"
                            ]
                        },
                        {
                            "heading": "세무서 근무",
                            "items": ["동수원세무서", "수원세무서", "안산세무서"]
                        },
                        { "heading": "학력", "items": ["세무대학 7회 졸업"] }
                    ]
                }
            }),
            SiteSection::Location => json!({
                "firmName": FIRM_NAME,
                "address": "경기 수원시 영통구 청명남로 6 4층",
                "phone": PHONE,
                "coordinates": { "lat": 37.2505091, "lng": 127.0737612 },
                "directions": "수인분당 영통역 2번 출구에서 217m",
                "hours": {
                    "weekdays": "09:00 - 18:00",
                    "weekends": "휴무",
                    "holidays": "휴무"
                }
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SiteResponse {
    pub section: SiteSection,
    pub content: Value,
}

/// GET /api/site/{section}
/// Also reports a page view; the response never waits on it.
pub async fn get_section(
    State(state): State<AppState>,
    Path(section): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<SiteResponse>> {
    let section: SiteSection = section.parse()?;

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut view = PageView::new(section.page());
    view.user_agent = user_agent;
    state.reporter.report(view);

    Ok(Json(SiteResponse {
        section,
        content: section.content(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::send;
    use crate::store::Collection;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/api/site/{section}", get(get_section))
            .with_state(state)
    }

    #[test]
    fn test_section_parsing() {
        assert_eq!("home".parse::<SiteSection>().unwrap(), SiteSection::Home);
        assert_eq!(SiteSection::Location.page(), "/location");
        assert!(matches!(
            "blog".parse::<SiteSection>(),
            Err(AppError::NotFound("Section"))
        ));
    }

    #[tokio::test]
    async fn test_location_content() {
        let state = AppState::for_tests();
        let (status, body) = send(router(state), "GET", "/api/site/location", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["section"], "location");
        assert_eq!(body["content"]["phone"], PHONE);
        assert_eq!(body["content"]["coordinates"]["lat"], 37.2505091);
    }

    #[tokio::test]
    async fn test_section_view_is_recorded() {
        let state = AppState::for_tests();
        let (status, _) = send(router(state.clone()), "GET", "/api/site/company", None, None).await;
        assert_eq!(status, StatusCode::OK);

        // The report runs on its own task; give it a moment to land.
        for _ in 0..50 {
            if state.store.count(Collection::Analytics, &[]).await.unwrap() == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("page view was never recorded");
    }

    #[tokio::test]
    async fn test_unknown_section_is_not_found() {
        let state = AppState::for_tests();
        let (status, body) = send(router(state), "GET", "/api/site/blog", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Section does not exist");
    }
}
