//! Routing backend HTTP client.

use reqwest::Client;
use tracing::debug;
use velo_core::{CostProfile, LatLon, NoGoArea, RawSample};

use crate::config::RouterConfig;
use crate::error::RoutingError;
use crate::profile::{profile_source, ProfileCache};
use crate::response::{parse_track, ProfileUpload};
use crate::retry::{RetryNotice, RetryPolicy};
use crate::service::{ProfileId, RouteRequest, RoutingService};

/// HTTP client for a BRouter-compatible backend.
pub struct HttpRouter {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    locate_profile: String,
    profiles: ProfileCache,
}

impl HttpRouter {
    pub fn new(config: RouterConfig) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RoutingError::Client)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            locate_profile: config.locate_profile,
            profiles: ProfileCache::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn profiles(&self) -> &ProfileCache {
        &self.profiles
    }

    async fn fetch_track(
        &self,
        lonlats: &str,
        profile: &str,
        nogos: Option<&str>,
    ) -> Result<Vec<RawSample>, RoutingError> {
        let url = format!("{}/brouter", self.base_url);
        let mut query = vec![
            ("lonlats", lonlats),
            ("profile", profile),
            ("alternativeidx", "0"),
            ("format", "geojson"),
        ];
        if let Some(nogos) = nogos {
            query.push(("nogos", nogos));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() || !body.trim_start().starts_with('{') {
            return Err(RoutingError::from_response(status.as_u16(), body));
        }
        parse_track(&body)
    }

    async fn upload_profile(&self, profile: &CostProfile) -> Result<ProfileId, RoutingError> {
        let url = format!("{}/brouter/profile", self.base_url);
        let source = profile_source(profile);

        let id = self
            .retry
            .run(&|_| {}, || async {
                let response = self
                    .client
                    .post(&url)
                    .header("Content-Type", "text/plain")
                    .body(source.clone())
                    .send()
                    .await?;
                let status = response.status();
                let body = response.text().await?;
                if !status.is_success() {
                    return Err(RoutingError::from_response(status.as_u16(), body));
                }
                let upload: ProfileUpload = serde_json::from_str(&body)
                    .map_err(|e| RoutingError::Malformed(e.to_string()))?;
                if let Some(error) = upload.error {
                    return Err(RoutingError::Rejected(error));
                }
                upload
                    .profileid
                    .map(ProfileId)
                    .ok_or_else(|| RoutingError::Malformed("missing profileid".to_string()))
            })
            .await?;

        debug!(profile_id = %id, "Compiled cost profile");
        Ok(id)
    }
}

fn format_lonlats(points: &[LatLon]) -> String {
    points
        .iter()
        .map(|p| format!("{:.6},{:.6}", p.lon, p.lat))
        .collect::<Vec<_>>()
        .join("|")
}

fn format_nogos(areas: &[NoGoArea]) -> Option<String> {
    if areas.is_empty() {
        return None;
    }
    Some(
        areas
            .iter()
            .map(|a| format!("{:.6},{:.6},{:.0}", a.center.lon, a.center.lat, a.radius_m))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

impl RoutingService for HttpRouter {
    async fn route(
        &self,
        request: &RouteRequest,
        on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
    ) -> Result<Vec<RawSample>, RoutingError> {
        let lonlats = format_lonlats(&[request.from, request.to]);
        let nogos = format_nogos(&request.no_go);
        debug!(
            lonlats = %lonlats,
            profile = %request.profile,
            no_go = request.no_go.len(),
            "Requesting route"
        );

        self.retry
            .run(on_retry, || {
                self.fetch_track(&lonlats, &request.profile.0, nogos.as_deref())
            })
            .await
    }

    async fn locate(
        &self,
        point: LatLon,
        on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
    ) -> Result<RawSample, RoutingError> {
        let lonlats = format_lonlats(&[point, point]);
        let samples = self
            .retry
            .run(on_retry, || {
                self.fetch_track(&lonlats, &self.locate_profile, None)
            })
            .await?;
        let mut sample = samples.into_iter().next().ok_or(RoutingError::EmptyPath)?;
        sample.time_s = 0.0;
        Ok(sample)
    }

    async fn compile_profile(&self, profile: &CostProfile) -> Result<ProfileId, RoutingError> {
        self.profiles
            .get_or_compile(profile, || self.upload_profile(profile))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lonlats_are_lon_first() {
        let s = format_lonlats(&[LatLon::new(47.5, 8.25), LatLon::new(47.0, 8.0)]);
        assert_eq!(s, "8.250000,47.500000|8.000000,47.000000");
    }

    #[test]
    fn nogos_are_omitted_when_empty() {
        assert_eq!(format_nogos(&[]), None);
        let s = format_nogos(&[NoGoArea::new(47.0, 8.0, 250.0)]).unwrap();
        assert_eq!(s, "8.000000,47.000000,250");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let router = HttpRouter::new(RouterConfig::new("http://router.local/")).unwrap();
        assert_eq!(router.base_url(), "http://router.local");
    }
}
