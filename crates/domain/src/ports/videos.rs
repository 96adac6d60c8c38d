use super::BoxFuture;
use super::comments::StoreError;
use crate::identity::VideoId;
use crate::related::{SuggestedVideoPreview, VideoRecord};

pub trait VideoCatalog: Send + Sync {
    fn get_video(&self, video_id: VideoId)
    -> BoxFuture<'_, Result<Option<VideoRecord>, StoreError>>;

    fn list_by_tag(
        &self,
        tag: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SuggestedVideoPreview>, StoreError>>;
}
