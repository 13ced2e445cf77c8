//! Attachment text extraction and inbound file downloads.

use std::sync::Arc;
use std::time::Duration;

use conflux_core::{
    AdapterError, AdapterResult, Attachment, FileFailure, FileInfo, MediaPolicy, MediaRejection,
    Message, Payload,
};
use tracing::{debug, error, info};

use crate::api::SlackApi;
use crate::classifier::SYSTEM_USER;
use crate::dedup::DedupCache;
use crate::model::{File, MessageEvent, MessageSubtype};

/// Pause before re-downloading a file whose size did not match.
const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Text standing in for a message that only carries attachments.
///
/// Each attachment renders as its (linked) title, text and footer, or its
/// fallback when it has no text. The last attachment wins.
pub fn attachment_text(attachments: &[Attachment]) -> Option<String> {
    attachments.iter().map(render_attachment).last()
}

fn render_attachment(attach: &Attachment) -> String {
    if attach.text.is_empty() {
        return attach.fallback.clone();
    }
    let mut text = match (attach.title.is_empty(), attach.title_link.is_empty()) {
        (true, _) => String::new(),
        (false, true) => attach.title.clone(),
        (false, false) => format!("[{}]({})\n", attach.title, attach.title_link),
    };
    text.push_str(&attach.text);
    if !attach.footer.is_empty() {
        text.push_str("\n\n");
        text.push_str(&attach.footer);
    }
    text
}

/// Fills in attachment-derived text and downloads attached files.
pub struct AttachmentHandler {
    api: Arc<dyn SlackApi>,
    dedup: Arc<DedupCache>,
    media: Arc<dyn MediaPolicy>,
}

impl AttachmentHandler {
    pub fn new(
        api: Arc<dyn SlackApi>,
        dedup: Arc<DedupCache>,
        media: Arc<dyn MediaPolicy>,
    ) -> Self {
        Self { api, dedup, media }
    }

    /// Applies the attachments and files of `ev` to `msg`.
    pub async fn handle(&self, ev: &MessageEvent, msg: &mut Message) {
        if ev.is(MessageSubtype::FileComment) {
            msg.username = SYSTEM_USER.to_string();
        }

        if msg.text.is_empty()
            && let Some(text) = attachment_text(&ev.attachments)
        {
            msg.text = text;
        }

        if !ev.attachments.is_empty() {
            msg.extra.push(Payload::Attachments(ev.attachments.clone()));
        }

        for file in &ev.files {
            self.dedup.bind_file_channel(&file.id, &ev.channel);
            if let Err(e) = self.download(msg, file).await {
                error!(file = %file.name, error = %e, "Could not download incoming file");
            }
        }
    }

    /// Downloads one file into `msg`.
    ///
    /// Cached and policy-rejected files are skipped without error. The
    /// message text becomes the caption of the first downloaded file.
    pub async fn download(&self, msg: &mut Message, file: &File) -> AdapterResult<()> {
        if self.dedup.file_cached(&file.id, &file.name) {
            debug!(file = %file.name, "File recently uploaded by us, not downloading");
            return Ok(());
        }

        if let Err(rejection) = self.media.check(&file.name, file.size) {
            if let MediaRejection::TooLarge { size, limit } = &rejection {
                msg.extra.push(Payload::FileTooLarge(FileFailure {
                    name: file.name.clone(),
                    size: *size,
                    limit: *limit,
                    comment: msg.text.clone(),
                }));
            }
            info!(file = %file.name, reason = %rejection, "Skipping download of incoming file");
            return Ok(());
        }

        let mut data = self.fetch(file).await?;
        if data.len() as u64 != file.size {
            debug!(
                file = %file.name,
                got = data.len(),
                declared = file.size,
                "Downloaded size differs from declared size, retrying once"
            );
            tokio::time::sleep(DOWNLOAD_RETRY_DELAY).await;
            data = self.fetch(file).await?;
        }

        let comment = std::mem::take(&mut msg.text);
        msg.extra.push(Payload::File(FileInfo {
            name: file.name.clone(),
            size: data.len() as u64,
            data: Some(data),
            comment,
            url: String::new(),
            avatar: false,
            native_id: file.id.clone(),
        }));
        Ok(())
    }

    async fn fetch(&self, file: &File) -> AdapterResult<Vec<u8>> {
        self.api
            .download_file(&file.url_private_download)
            .await
            .map_err(|e| AdapterError::Download {
                url: file.url_private_download.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use conflux_core::SizePolicy;
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::testing::{ApiCall, FakeSlackApi};

    const URL: &str = "https://files.slack.com/F1/cat.png";

    fn handler(api: FakeSlackApi) -> (AttachmentHandler, Arc<FakeSlackApi>, Arc<DedupCache>) {
        let api = Arc::new(api);
        let dedup = Arc::new(DedupCache::new());
        let handler = AttachmentHandler::new(
            api.clone(),
            dedup.clone(),
            Arc::new(SizePolicy::new(10, &[r"\.exe$".to_string()])),
        );
        (handler, api, dedup)
    }

    fn file(name: &str, size: u64) -> File {
        File {
            id: "F1".into(),
            name: name.into(),
            size,
            url_private_download: URL.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_attachment_text_last_one_wins() {
        let attachments = vec![
            Attachment {
                title: "First".into(),
                title_link: "https://a.example".into(),
                text: "body".into(),
                footer: "foot".into(),
                ..Default::default()
            },
            Attachment {
                fallback: "second fallback".into(),
                ..Default::default()
            },
        ];
        assert_eq!(
            attachment_text(&attachments[..1]).as_deref(),
            Some("[First](https://a.example)\nbody\n\nfoot")
        );
        assert_eq!(
            attachment_text(&attachments).as_deref(),
            Some("second fallback")
        );
        assert_eq!(attachment_text(&[]), None);
    }

    #[tokio::test]
    async fn test_handle_preserves_attachments_and_binds_channel() {
        let (handler, _, dedup) = handler(FakeSlackApi::new().with_download(URL, vec![vec![0; 3]]));
        let ev: MessageEvent = serde_json::from_value(json!({
            "subtype": "file_comment",
            "channel": "C1",
            "attachments": [{ "title": "T", "text": "x" }],
            "files": [{ "id": "F1", "name": "cat.png", "size": 3, "url_private_download": URL }]
        }))
        .unwrap();

        let mut msg = Message::default();
        handler.handle(&ev, &mut msg).await;

        assert_eq!(msg.username, SYSTEM_USER);
        assert_eq!(msg.attachments().len(), 1);
        assert_eq!(dedup.file_channel("F1").as_deref(), Some("C1"));
        let file = msg.files().next().unwrap();
        assert_eq!(file.comment, "Tx");
        // caption moved onto the file
        assert_eq!(msg.text, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_mismatch_retried_once() {
        let (handler, api, _) =
            handler(FakeSlackApi::new().with_download(URL, vec![vec![0; 2], vec![0; 5], vec![0; 4]]));
        let mut msg = Message::text("caption");
        let started = Instant::now();

        handler.download(&mut msg, &file("cat.png", 5)).await.unwrap();

        assert_eq!(api.count(|c| matches!(c, ApiCall::Download(_))), 2);
        assert!(started.elapsed() >= DOWNLOAD_RETRY_DELAY);
        let file = msg.files().next().unwrap();
        assert_eq!(file.data.as_deref().map(<[u8]>::len), Some(5));
        assert_eq!(file.comment, "caption");
        assert!(msg.text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_mismatch_accepted() {
        let (handler, api, _) =
            handler(FakeSlackApi::new().with_download(URL, vec![vec![0; 2], vec![0; 3]]));
        let mut msg = Message::default();
        handler.download(&mut msg, &file("cat.png", 5)).await.unwrap();

        assert_eq!(api.count(|c| matches!(c, ApiCall::Download(_))), 2);
        assert_eq!(msg.files().next().unwrap().size, 3);
    }

    #[tokio::test]
    async fn test_policy_rejections_are_not_errors() {
        let (handler, api, _) = handler(FakeSlackApi::new());

        let mut msg = Message::text("look");
        handler.download(&mut msg, &file("setup.exe", 1)).await.unwrap();
        assert!(msg.extra.is_empty());

        handler.download(&mut msg, &file("huge.png", 11)).await.unwrap();
        assert_eq!(
            msg.file_failures().cloned().collect::<Vec<_>>(),
            [FileFailure {
                name: "huge.png".into(),
                size: 11,
                limit: 10,
                comment: "look".into(),
            }]
        );
        assert_eq!(msg.text, "look");
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cached_file_not_downloaded_and_fetch_error_reported() {
        let (handler, api, dedup) = handler(FakeSlackApi::new());
        dedup.mark_file_id("F1");
        let mut msg = Message::default();
        handler.download(&mut msg, &file("cat.png", 3)).await.unwrap();
        assert!(api.calls().is_empty());

        let mut other = file("dog.png", 3);
        other.id = "F2".into();
        let err = handler.download(&mut msg, &other).await.unwrap_err();
        assert!(matches!(err, AdapterError::Download { .. }));
    }
}
