//! Getting an uploaded file in front of the assistant.
//!
//! Two strategies exist for the same end:
//!
//! - [`UploadStrategy::VectorStore`]: ingest the file into one shared, named vector store and
//!   point the assistant's `file_search` tool at that store. The user message itself carries no
//!   attachment.
//! - [`UploadStrategy::Attachment`]: upload the file and attach it to the user message by id, so
//!   `file_search` picks it up for that thread only.

use tracing::{debug, info, instrument, warn};

use crate::config::UploadsConfig;
use crate::envelope::FileUpload;
use crate::errors::{Error, Result};
use crate::types::{UploadStrategy, VectorStoreId};
use crate::upstream::AssistantApi;
use crate::upstream::models::{FileBatch, MessageAttachment};

/// Find the vector store called `name`, creating it when no store has that name.
#[instrument(skip(api), err)]
pub async fn get_or_create_vector_store(api: &dyn AssistantApi, name: &str) -> Result<VectorStoreId> {
    let existing = api.list_vector_stores().await?;

    if let Some(store) = existing.into_iter().find(|store| store.name.as_deref() == Some(name)) {
        debug!(vector_store_id = %store.id, "Reusing existing vector store");
        return Ok(store.id);
    }

    let store = api.create_vector_store(name).await?;
    info!(vector_store_id = %store.id, "Created vector store");
    Ok(store.id)
}

/// Upload a file, add it to the vector store as a file batch, and wait for ingestion to finish.
#[instrument(skip(api, file, config), fields(file = %file.name), err)]
pub async fn upload_and_poll(api: &dyn AssistantApi, vector_store_id: &str, file: &FileUpload, config: &UploadsConfig) -> Result<FileBatch> {
    let bytes = decode_checked(file, config)?;
    let uploaded = api.upload_file(&file.name, &file.mime_type, bytes).await?;

    let mut batch = api.create_file_batch(vector_store_id, std::slice::from_ref(&uploaded.id)).await?;
    let mut polls = 0;
    while batch.is_pending() {
        if polls >= config.max_polls {
            warn!(batch_id = %batch.id, polls, "File batch still in progress, giving up");
            return Err(Error::UploadIncomplete {
                batch_id: batch.id,
                status: "in_progress".to_string(),
            });
        }
        tokio::time::sleep(config.poll_interval).await;
        batch = api.get_file_batch(vector_store_id, &batch.id).await?;
        polls += 1;
    }

    if batch.status != "completed" {
        return Err(Error::UploadIncomplete {
            batch_id: batch.id,
            status: batch.status,
        });
    }
    if batch.file_counts.failed > 0 {
        warn!(batch_id = %batch.id, failed = batch.file_counts.failed, "File batch completed with failed files");
    }

    info!(batch_id = %batch.id, polls, "Vector store file batch completed");
    Ok(batch)
}

/// Run the configured strategy for `file` and return the attachments the user message needs.
#[instrument(skip(api, file, config), fields(strategy = %config.strategy, file = %file.name), err)]
pub async fn prepare_attachment(
    api: &dyn AssistantApi,
    config: &UploadsConfig,
    assistant_id: &str,
    file: &FileUpload,
) -> Result<Vec<MessageAttachment>> {
    match config.strategy {
        UploadStrategy::VectorStore => {
            let vector_store_id = get_or_create_vector_store(api, &config.vector_store_name).await?;
            let batch = upload_and_poll(api, &vector_store_id, file, config).await?;
            api.update_assistant_vector_stores(assistant_id, std::slice::from_ref(&vector_store_id))
                .await?;
            info!(vector_store_id = %vector_store_id, batch_id = %batch.id, "Vector store updated and file uploaded");
            Ok(Vec::new())
        }
        UploadStrategy::Attachment => {
            let bytes = decode_checked(file, config)?;
            let uploaded = api.upload_file(&file.name, &file.mime_type, bytes).await?;
            info!(file_id = %uploaded.id, "File uploaded for message attachment");
            Ok(vec![MessageAttachment::file_search(uploaded.id)])
        }
    }
}

fn decode_checked(file: &FileUpload, config: &UploadsConfig) -> Result<bytes::Bytes> {
    let bytes = file.decode()?;
    let size = bytes.len() as u64;
    if size > config.max_file_size {
        return Err(Error::FileTooLarge {
            size,
            limit: config.max_file_size,
        });
    }
    if file.size != 0 && file.size != size {
        debug!(declared = file.size, decoded = size, "Declared file size differs from decoded content");
    }
    Ok(bytes)
}
