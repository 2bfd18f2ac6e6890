use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use circle_backend::records;
use circle_types::Query;
use circle_types::api::{AvatarPatch, ProfileUpdate};
use circle_types::models::User;

use crate::context::AppContext;
use crate::error::{CoreError, Result};

/// Patch the profile fields that are set. An empty update changes nothing.
pub async fn update_profile(ctx: &AppContext, update: &ProfileUpdate) -> Result<User> {
    if update.is_empty() {
        return ctx.refresh_user().await;
    }
    let id = ctx.user_id()?;
    let user = records::patch::<User, _>(ctx.backend(), &by_id(id), update)
        .await?
        .pop()
        .ok_or(CoreError::UnknownUser(id))?;
    ctx.set_user(Some(user.clone()));
    Ok(user)
}

fn extension(content_type: &str) -> &'static str {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "bin",
    }
}

/// Object path for an avatar: content-addressed under the owner's folder.
pub fn avatar_path(user_id: Uuid, data: &[u8], content_type: &str) -> String {
    let digest = hex::encode(Sha256::digest(data));
    format!("avatars/{}/{}.{}", user_id, digest, extension(content_type))
}

pub async fn upload_avatar(ctx: &AppContext, data: Bytes, content_type: &str) -> Result<User> {
    let id = ctx.user_id()?;
    let path = avatar_path(id, &data, content_type);
    let bucket = &ctx.settings().storage_bucket;

    let url = ctx.backend().upload(bucket, &path, content_type, data).await?;
    info!("Uploaded avatar for {} to {}", id, path);

    let user = records::patch::<User, _>(ctx.backend(), &by_id(id), &AvatarPatch { avatar_url: &url })
        .await?
        .pop()
        .ok_or(CoreError::UnknownUser(id))?;
    ctx.set_user(Some(user.clone()));
    Ok(user)
}

fn by_id(id: Uuid) -> Query {
    Query::new().eq("id", id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_paths_are_content_addressed() {
        let user = Uuid::new_v4();
        let a = avatar_path(user, b"one", "image/png");
        assert_eq!(a, avatar_path(user, b"one", "image/png"));
        assert_ne!(a, avatar_path(user, b"two", "image/png"));
        assert!(a.starts_with(&format!("avatars/{}/", user)));
        assert!(a.ends_with(".png"));
        assert!(avatar_path(user, b"x", "IMAGE/JPEG").ends_with(".jpg"));
        assert!(avatar_path(user, b"x", "application/pdf").ends_with(".bin"));
    }
}
