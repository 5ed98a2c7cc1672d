use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    options::{
        Acknowledgment, ClientOptions, DeleteOptions, FindOptions, InsertOneOptions,
        UpdateOptions, WriteConcern as MongoWriteConcern,
    },
};
use tracing::{info, trace};

use docmodel_core::{
    backend::{
        DeleteOutcome, InsertOutcome, StoreBackend, StoreBackendBuilder, Update, UpdateOutcome,
        WriteConcern, WriteOptions,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query, QueryVisitor, SortDirection},
};

use crate::{error::classify, query::MongoQueryTranslator};

fn write_concern(concern: WriteConcern) -> MongoWriteConcern {
    let acknowledgment = match concern {
        WriteConcern::Unacknowledged => Acknowledgment::Nodes(0),
        WriteConcern::Acknowledged => Acknowledgment::Nodes(1),
        WriteConcern::Majority => Acknowledgment::Majority,
        WriteConcern::Nodes(nodes) => Acknowledgment::Nodes(nodes),
    };

    MongoWriteConcern::builder().w(acknowledgment).build()
}

fn cursor_limit(limit: usize) -> DocumentStoreResult<i64> {
    i64::try_from(limit).map_err(|_| {
        DocumentStoreError::InvalidArgument(format!("limit {limit} is out of range"))
    })
}

fn translate(filter: Option<&Expr>) -> DocumentStoreResult<Document> {
    match filter {
        Some(expr) => MongoQueryTranslator.visit_expr(expr),
        None => Ok(doc! {}),
    }
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        info!(database = %self.database, "shutting down MongoDB client");
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> DocumentStoreResult<InsertOutcome> {
        let mut insert_options = InsertOneOptions::default();
        insert_options.write_concern = Some(write_concern(options.write_concern));

        trace!(collection, id = ?document.get("_id"), "inserting document");
        self.get_collection(collection)
            .insert_one(document)
            .with_options(insert_options)
            .await
            .map_err(|e| classify(e, collection))?;

        Ok(InsertOutcome {
            acknowledged: options.write_concern.is_acknowledged(),
            inserted_count: 1,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: &Update,
        options: &WriteOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        if update.is_empty() {
            return Err(DocumentStoreError::InvalidArgument("update must not be empty".to_string()));
        }

        let mut update_options = UpdateOptions::default();
        update_options.upsert = Some(options.upsert);
        update_options.write_concern = Some(write_concern(options.write_concern));

        let result = self
            .get_collection(collection)
            .update_one(translate(Some(filter))?, update.to_document())
            .with_options(update_options)
            .await
            .map_err(|e| classify(e, collection))?;

        Ok(UpdateOutcome {
            acknowledged: options.write_concern.is_acknowledged(),
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(result.upserted_id.is_some()),
        })
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        let mut delete_options = DeleteOptions::default();
        delete_options.write_concern = Some(write_concern(options.write_concern));

        let result = self
            .get_collection(collection)
            .delete_one(translate(Some(filter))?)
            .with_options(delete_options)
            .await
            .map_err(|e| classify(e, collection))?;

        Ok(DeleteOutcome {
            acknowledged: options.write_concern.is_acknowledged(),
            deleted_count: result.deleted_count,
        })
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        let mut delete_options = DeleteOptions::default();
        delete_options.write_concern = Some(write_concern(options.write_concern));

        let result = self
            .get_collection(collection)
            .delete_many(translate(Some(filter))?)
            .with_options(delete_options)
            .await
            .map_err(|e| classify(e, collection))?;

        Ok(DeleteOutcome {
            acknowledged: options.write_concern.is_acknowledged(),
            deleted_count: result.deleted_count,
        })
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(count) = query.limit {
            options.limit = Some(cursor_limit(count)?);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if let Some(sort) = &query.sort {
            options.sort = Some(doc! {
                sort.field.clone(): match sort.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                }
            })
        }

        self.get_collection(collection)
            .find(translate(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(|e| classify(e, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| classify(e, collection))
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(translate(filter)?)
            .await
            .map_err(|e| classify(e, collection))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        info!(database = %self.database, "connecting to MongoDB");

        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_concerns_map_to_acknowledgment() {
        assert_eq!(write_concern(WriteConcern::Unacknowledged).w, Some(Acknowledgment::Nodes(0)));
        assert_eq!(write_concern(WriteConcern::Majority).w, Some(Acknowledgment::Majority));
        assert_eq!(write_concern(WriteConcern::Nodes(3)).w, Some(Acknowledgment::Nodes(3)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn limits_beyond_the_cursor_range_are_rejected() {
        assert_eq!(cursor_limit(25).unwrap(), 25);
        assert_eq!(cursor_limit(i64::MAX as usize).unwrap(), i64::MAX);
        assert!(matches!(
            cursor_limit(usize::MAX),
            Err(DocumentStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_filter_matches_everything() {
        assert_eq!(translate(None).unwrap(), doc! {});
    }
}
