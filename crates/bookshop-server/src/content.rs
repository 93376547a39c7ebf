//! Protected Content Delivery
//!
//! Streams an item's file from the content root once access has been
//! granted. Responses are marked uncacheable and unframeable.

use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    response::Response,
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use bookshop_core::{CoreError, Item};

use crate::error::{ApiError, ApiResult};

const NO_STORE: &str = "no-store, no-cache, must-revalidate, private";
const CONTENT_POLICY: &str = "default-src 'none'; frame-ancestors 'none'";

/// Resolve a content reference under `root`.
///
/// Absolute references and any `..` component are refused.
pub fn resolve(root: &Path, content_ref: &str) -> Option<PathBuf> {
    let relative = Path::new(content_ref.trim());
    if relative.as_os_str().is_empty() {
        return None;
    }

    let mut path = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    (path != root).then_some(path)
}

/// Header-safe file name for `Content-Disposition`
pub fn download_name(item: &Item) -> String {
    let mut name: String = item
        .name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        name = format!("item-{}", item.id);
    }

    if let Some(ext) = Path::new(&item.content_ref).extension().and_then(|e| e.to_str()) {
        let suffix = format!(".{ext}");
        if ext.chars().all(|c| c.is_ascii_alphanumeric())
            && !name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
        {
            name.push_str(&suffix);
        }
    }

    name
}

/// Stream the content file of an already-authorized item
pub async fn serve(root: &Path, item: &Item) -> ApiResult<Response> {
    let not_found = || ApiError::from(CoreError::not_found("Content", item.id));

    let path = resolve(root, &item.content_ref).ok_or_else(|| {
        tracing::warn!(item_id = %item.id, content_ref = %item.content_ref, "Refusing content reference");
        not_found()
    })?;

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            tracing::warn!(item_id = %item.id, path = %path.display(), "Content file missing");
            return Err(not_found());
        }
    }

    let response = match ServeFile::new(&path).oneshot(Request::new(Body::empty())).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let (mut parts, body) = response.into_parts();
    if !parts.status.is_success() {
        tracing::warn!(item_id = %item.id, status = %parts.status, "Content file could not be served");
        return Err(not_found());
    }

    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{}\"", download_name(item)))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let headers = &mut parts.headers;
    headers.remove(header::LAST_MODIFIED);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_POLICY),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    tracing::info!(item_id = %item.id, "Serving protected content");
    Ok(Response::from_parts(parts, Body::new(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use bookshop_core::ItemId;
    use http_body_util::BodyExt;

    fn item(name: &str, content_ref: &str) -> Item {
        Item {
            id: ItemId::new(3),
            name: name.into(),
            price: 500,
            content_ref: content_ref.into(),
            locale: "en".into(),
        }
    }

    #[test]
    fn test_resolve_stays_under_root() {
        let root = Path::new("/srv/media");
        assert_eq!(
            resolve(root, "books/en.pdf"),
            Some(PathBuf::from("/srv/media/books/en.pdf"))
        );
        assert_eq!(
            resolve(root, "./books/en.pdf"),
            Some(PathBuf::from("/srv/media/books/en.pdf"))
        );
        assert_eq!(resolve(root, "../secrets.env"), None);
        assert_eq!(resolve(root, "books/../../etc/passwd"), None);
        assert_eq!(resolve(root, "/etc/passwd"), None);
        assert_eq!(resolve(root, ""), None);
        assert_eq!(resolve(root, "."), None);
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name(&item("Map Your Freedom", "books/en.pdf")), "Map Your Freedom.pdf");
        assert_eq!(download_name(&item("Guide.PDF", "books/en.pdf")), "Guide.PDF");
        assert_eq!(download_name(&item("Évasion \"2\"", "b.pdf")), "_vasion _2_.pdf");
        assert_eq!(download_name(&item("  ", "b")), "item-3");
    }

    #[tokio::test]
    async fn test_serve_sets_protective_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("books")).unwrap();
        std::fs::write(dir.path().join("books/en.pdf"), b"%PDF-1.4 test").unwrap();

        let response = serve(dir.path(), &item("Map Your Freedom", "books/en.pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers[header::CACHE_CONTROL], NO_STORE);
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], CONTENT_POLICY);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "inline; filename=\"Map Your Freedom.pdf\""
        );
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert!(headers.get(header::LAST_MODIFIED).is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn test_missing_or_escaping_content_is_not_found() {
        let dir = tempfile::tempdir().unwrap();

        for content_ref in ["books/absent.pdf", "../outside.pdf", ""] {
            let err = serve(dir.path(), &item("Book", content_ref)).await.unwrap_err();
            assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND, "{content_ref}");
        }
    }
}
