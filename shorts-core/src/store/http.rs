use super::{Payload, RemoteStore, ResourceKey, WriteMode};
use crate::config::Settings;
use crate::{Error, Result};
use ::utils::surf_logging::SurfLogging;
use ::utils::url::{with_query, with_segments};
use async_trait::async_trait;
use surf::{Client, StatusCode, Url};

const FILES_SEGMENT: &str = "files";

/// Store backed by a REST file service.
///
/// * `GET    {base}/files/{path}`   read a resource (404 when absent)
/// * `PUT    {base}/files/{path}`   overwrite it
/// * `POST   {base}/files/{path}`   append to it
/// * `GET    {base}/files?prefix=`  list resource paths
///
/// Bodies are the JSON form of `Payload`.
#[derive(Clone)]
pub struct HttpStore {
    http: Client,
    base: Url,
}

impl HttpStore {
    pub fn new(base: Url) -> Self {
        Self {
            http: Client::new().with(SurfLogging),
            base,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let raw = settings
            .store_url
            .as_deref()
            .ok_or_else(|| Error::ConfigError("store_url is not set".to_string()))?;
        let base = Url::parse(raw)
            .map_err(|e| Error::ConfigError(format!("invalid store_url {}: {}", raw, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::ConfigError(format!("store_url {} cannot carry a path", raw)));
        }
        Ok(Self::new(base))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn file_url(&self, key: &ResourceKey) -> Result<Url> {
        let path = key.path();
        let segments = std::iter::once(FILES_SEGMENT).chain(path.split('/'));
        with_segments(&self.base, segments)
            .ok_or_else(|| Error::ConfigError(format!("store_url {} cannot carry a path", self.base)))
    }

    fn list_url(&self, prefix: &str) -> Result<Url> {
        let files = with_segments(&self.base, [FILES_SEGMENT])
            .ok_or_else(|| Error::ConfigError(format!("store_url {} cannot carry a path", self.base)))?;
        Ok(with_query(&files, "prefix", prefix))
    }
}

fn unavailable(err: surf::Error) -> Error {
    Error::StoreUnavailable(err.to_string())
}

fn check_status(status: StatusCode, target: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NotFound {
        return Err(Error::NotFound(target.to_string()));
    }
    log::warn!("Store answered {} for {}", status, target);
    Err(Error::StoreUnavailable(format!("HTTP {} for {}", status, target)))
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn read(&self, key: &ResourceKey) -> Result<Payload> {
        let mut res = self.http.get(self.file_url(key)?).await.map_err(unavailable)?;
        check_status(res.status(), &key.path())?;
        res.body_json::<Payload>().await.map_err(unavailable)
    }

    async fn write(&self, key: &ResourceKey, payload: Payload, mode: WriteMode) -> Result<()> {
        let url = self.file_url(key)?;
        let request = match mode {
            WriteMode::Overwrite => self.http.put(url),
            WriteMode::Append => self.http.post(url),
        };
        let res = request.body_json(&payload).map_err(unavailable)?.await.map_err(unavailable)?;
        check_status(res.status(), &key.path())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ResourceKey>> {
        let mut res = self.http.get(self.list_url(prefix)?).await.map_err(unavailable)?;
        check_status(res.status(), prefix)?;
        let paths: Vec<String> = res.body_json().await.map_err(unavailable)?;

        Ok(paths
            .into_iter()
            .filter_map(|path| match path.parse::<ResourceKey>() {
                Ok(key) => Some(key),
                Err(_) => {
                    log::debug!("Skipping unrecognised store path: {}", path);
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HttpStore {
        HttpStore::new(Url::parse("http://drive.local:9000/api/").unwrap())
    }

    #[test]
    fn test_file_urls() {
        let url = store().file_url(&ResourceKey::Titles("Movie Facts".to_string())).unwrap();
        assert_eq!(
            url.as_str(),
            "http://drive.local:9000/api/files/Movie%20Facts/titles_movie%20facts.txt"
        );

        let url = store().file_url(&ResourceKey::Users).unwrap();
        assert_eq!(url.as_str(), "http://drive.local:9000/api/files/users.json");
    }

    #[test]
    fn test_list_url() {
        let url = store().list_url("MovieFacts/backups/").unwrap();
        assert_eq!(
            url.as_str(),
            "http://drive.local:9000/api/files?prefix=MovieFacts%2Fbackups%2F"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status(StatusCode::Ok, "users.json").is_ok());
        assert!(matches!(
            check_status(StatusCode::NotFound, "users.json"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            check_status(StatusCode::BadGateway, "users.json"),
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_from_settings_requires_url() {
        let settings = Settings::default();
        assert!(matches!(
            HttpStore::from_settings(&settings),
            Err(Error::ConfigError(_))
        ));

        let settings = Settings {
            store_url: Some("http://drive.local/api".to_string()),
            ..Settings::default()
        };
        let store = HttpStore::from_settings(&settings).unwrap();
        assert_eq!(store.base().host_str(), Some("drive.local"));
    }
}
