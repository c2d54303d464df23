use crate::cli::Common;
use crate::commands::print_json;
use crate::config::DocketConfig;
use crate::error::CliError;
use docket_store::{Datastore, Document, QueryOptions, REVISION_FIELD, SetOptions};
use serde_json::{Value, json};

/// Flags for `docket keys`.
pub struct KeysArgs {
    pub start_key: Option<String>,
    pub end_key: Option<String>,
    pub key: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub descending: bool,
    pub docs: bool,
}

impl KeysArgs {
    fn query_options(&self) -> QueryOptions {
        let mut options = QueryOptions::new()
            .limit(self.limit)
            .starting_at(self.offset)
            .descending(self.descending)
            .include_documents(self.docs);
        if let Some(key) = &self.key {
            options = options.key(key.as_str());
        }
        if let Some(start) = &self.start_key {
            options = options.start_key(start.as_str());
        }
        if let Some(end) = &self.end_key {
            options = options.end_key(end.as_str());
        }
        options
    }
}

async fn open_store(common: &Common) -> Result<Datastore, CliError> {
    let config = DocketConfig::load(common.config.as_deref())?;
    let options = config.datastore_options(common)?;
    let store = Datastore::with_options(&options)?;
    store.load().await?;
    Ok(store)
}

fn revision(document: &Document) -> Value {
    document.get(REVISION_FIELD).cloned().unwrap_or(Value::Null)
}

pub async fn run_get(key: String, common: Common) -> Result<(), CliError> {
    let store = open_store(&common).await?;
    let document = store.get_item(&key).await?;

    if common.json {
        print_json(&json!({
            "action": "get",
            "key": key,
            "found": document.is_some(),
            "document": document,
        }));
        return Ok(());
    }
    match document {
        Some(document) => print_json(&document),
        None => println!("docket get\n  Key: {key}\n  Not found"),
    }
    Ok(())
}

pub async fn run_put(
    key: String,
    json_body: String,
    force: bool,
    common: Common,
) -> Result<(), CliError> {
    let body: Value = serde_json::from_str(&json_body).map_err(CliError::InvalidJson)?;
    let store = open_store(&common).await?;
    let options = if force {
        SetOptions::unchecked()
    } else {
        SetOptions::default()
    };
    let document = store.set_item(&key, body, options).await?;

    if common.json {
        print_json(&json!({
            "action": "put",
            "key": key,
            "document": document,
        }));
    } else {
        println!(
            "docket put\n  Key: {key}\n  Revision: {}",
            revision(&document)
        );
    }
    Ok(())
}

pub async fn run_delete(key: String, common: Common) -> Result<(), CliError> {
    let store = open_store(&common).await?;
    let deleted = store.delete_item(&key).await?;

    if common.json {
        print_json(&json!({
            "action": "delete",
            "key": key,
            "deleted": deleted,
        }));
    } else if deleted {
        println!("docket delete\n  Deleted: {key}");
    } else {
        println!("docket delete\n  Key: {key}\n  Not found");
    }
    Ok(())
}

pub async fn run_keys(args: KeysArgs, common: Common) -> Result<(), CliError> {
    let store = open_store(&common).await?;
    let page = store.query_keys(args.query_options()).await?;

    if common.json {
        print_json(&page);
        return Ok(());
    }
    println!(
        "docket keys\n  Rows: {}\n  Returned: {}",
        page.total_rows,
        page.items.len()
    );
    for item in &page.items {
        match &item.document {
            Some(document) => println!("  - {} (rev {})", item.document_key, revision(document)),
            None => println!("  - {}", item.document_key),
        }
    }
    if let Some(next) = page.exclusive_end_index {
        println!("  Next page: --offset {next}");
    }
    Ok(())
}
