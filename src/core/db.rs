use tracing::info;

use crate::core::helpers::{new_id, now};
use crate::core::store::Store;
use crate::models::models::Post;
use crate::posts::insert_post;
use crate::users::{create_user, RegistrationError};

pub const DEMO_USERNAME: &str = "test";
const DEMO_PASSWORD: &str = "test";

/// Creates the `test`/`test` account with one post. A no-op when the account
/// is already registered.
pub async fn init_demo_data(store: &Store) -> anyhow::Result<()> {
    let user = match create_user(store, DEMO_USERNAME, DEMO_PASSWORD).await {
        Ok(user) => user,
        Err(RegistrationError::UserExists) => {
            info!("demo data already present");
            return Ok(());
        }
        Err(e) => return Err(anyhow::anyhow!(e)),
    };

    let post = Post {
        id: new_id(),
        title: "Bruno".to_string(),
        image: "https://images.dog.ceo/breeds/retriever-golden/n02099601_3004.jpg".to_string(),
        description: "Bruno loves the beach. More of him at https://dog.ceo".to_string(),
        author: user.id.clone(),
        created_at: now(),
        updated_at: None,
    };
    insert_post(store, &post).await?;

    info!(user_id = %user.id, post_id = %post.id, "demo data created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::recent_posts;
    use crate::users::find_user_by_username;

    #[tokio::test]
    async fn seeding_twice_creates_one_account_and_post() {
        let store = Store::memory();
        init_demo_data(&store).await.unwrap();
        init_demo_data(&store).await.unwrap();

        let user = find_user_by_username(&store, DEMO_USERNAME).await.unwrap().unwrap();
        let posts = recent_posts(&store, 0, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author, user.id);
    }
}
