use std::sync::Arc;

use super::render::QuoteRenderer;
use crate::api::ApiClient;
use crate::storage::Database;

/// Posts the quote due next as an image.
pub struct QuotePublisher<R> {
    db: Database,
    client: ApiClient,
    renderer: Arc<R>,
}

impl<R: QuoteRenderer + 'static> QuotePublisher<R> {
    pub fn new(db: Database, client: ApiClient, renderer: R) -> Self {
        Self {
            db,
            client,
            renderer: Arc::new(renderer),
        }
    }

    /// Render, upload, post, then stamp the least recently published quote.
    ///
    /// Returns `false` if any step fails. Nothing is rolled back: a quote
    /// that was posted but could not be stamped will be posted again next time.
    pub async fn publish_quote(&self) -> bool {
        let quote = match self.db.next_quote().await {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                tracing::warn!("No quotes available to publish");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load next quote");
                return false;
            }
        };

        let renderer = Arc::clone(&self.renderer);
        let (text, author) = (quote.text.clone(), quote.author.clone());
        let image = match tokio::task::spawn_blocking(move || renderer.render(&text, &author)).await
        {
            Ok(Ok(image)) if !image.is_empty() => image,
            Ok(Ok(_)) => {
                tracing::warn!(quote_id = quote.id, "Renderer produced no image");
                return false;
            }
            Ok(Err(e)) => {
                tracing::warn!(quote_id = quote.id, error = %e, "Quote rendering failed");
                return false;
            }
            Err(e) => {
                tracing::error!(quote_id = quote.id, error = %e, "Rendering task panicked");
                return false;
            }
        };

        let media_id = match self.client.upload_media(image).await {
            Ok(media_id) => media_id,
            Err(e) => {
                tracing::warn!(quote_id = quote.id, error = %e, "Quote image upload failed");
                return false;
            }
        };

        if let Err(e) = self.client.post_status("", Some(&media_id)).await {
            tracing::warn!(quote_id = quote.id, error = %e, "Quote post failed");
            return false;
        }

        let now = chrono::Utc::now().timestamp();
        if let Err(e) = self.db.mark_quote_published(quote.id, now).await {
            tracing::warn!(
                quote_id = quote.id,
                error = %e,
                "Quote posted but publish time not recorded; it may be posted again"
            );
            return false;
        }

        tracing::info!(quote_id = quote.id, author = %quote.author, "Quote published");
        true
    }
}
