use anyhow::Result;
use std::sync::Arc;

use crate::app::error::{FieldErrorCode, LinkError, ValidationErrors};
use crate::domain::category::Category;
use crate::domain::requester::Requester;
use crate::infra::store::LinkStore;

pub const CATEGORY_TITLE_MAX_CHARS: usize = 60;

#[derive(Clone)]
pub struct CategoryService {
    store: Arc<dyn LinkStore>,
}

impl CategoryService {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Category>> {
        self.store.list_categories().await
    }

    pub async fn create(
        &self,
        title: &str,
        display_order: i32,
        requester: &Requester,
    ) -> Result<Category, LinkError> {
        if !requester.is_moderator() {
            return Err(LinkError::PermissionDenied);
        }

        let title = title.trim();
        let mut errors = ValidationErrors::new();
        if title.is_empty() {
            errors.add("title", FieldErrorCode::Required, "This field is required.");
        } else if title.chars().count() > CATEGORY_TITLE_MAX_CHARS {
            errors.add(
                "title",
                FieldErrorCode::TooLong,
                format!(
                    "Ensure this value has at most {} characters.",
                    CATEGORY_TITLE_MAX_CHARS
                ),
            );
        }
        errors.into_result()?;

        let mut tx = self.store.begin().await?;
        let category = tx.insert_category(title, display_order).await?.ok_or_else(|| {
            LinkError::field(
                "title",
                FieldErrorCode::DuplicateTitle,
                "A category with this title already exists.",
            )
        })?;
        tx.commit().await?;
        Ok(category)
    }

    /// Links in the category stay, uncategorized.
    pub async fn delete(&self, id: i64, requester: &Requester) -> Result<(), LinkError> {
        if !requester.is_moderator() {
            return Err(LinkError::PermissionDenied);
        }

        let mut tx = self.store.begin().await?;
        if !tx.delete_category(id).await? {
            return Err(LinkError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn ordered_by_display_order_then_title() {
        let service = CategoryService::new(Arc::new(MemoryStore::new()));
        let moderator = Requester::moderator(Uuid::new_v4());
        service.create("News", 2, &moderator).await.unwrap();
        service.create("Sports", 1, &moderator).await.unwrap();
        service.create("Art", 2, &moderator).await.unwrap();

        let titles: Vec<String> = service
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|category| category.title)
            .collect();
        assert_eq!(titles, vec!["Sports", "Art", "News"]);
    }

    #[tokio::test]
    async fn titles_are_unique_and_authors_cannot_create() {
        let service = CategoryService::new(Arc::new(MemoryStore::new()));
        let moderator = Requester::moderator(Uuid::new_v4());
        service.create("News", 0, &moderator).await.unwrap();
        assert!(service.create("News", 1, &moderator).await.is_err());

        let err = service
            .create("Music", 0, &Requester::author(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::PermissionDenied));
    }
}
