use anyhow::{Context, Result};
use clap::Args;
use dynamics_webapi::api::{DynamicsClient, FindRequest, Many, Property, PropertyKind, QueryBuilder, Untyped};
use futures::TryStreamExt;
use log::info;
use std::io::Write;
use tokio_util::sync::CancellationToken;

type Column = Property<Untyped, serde_json::Value>;
type Link = Property<Untyped, Many<Untyped>>;

#[derive(Args)]
pub struct QueryCommands {
    /// Entity set to query (e.g. "contacts")
    pub entity_set: String,
    /// Columns to return
    #[arg(long, value_delimiter = ',')]
    pub select: Vec<String>,
    /// Navigation properties to expand
    #[arg(long, value_delimiter = ',')]
    pub expand: Vec<String>,
    /// Sort keys as `column` or `column:desc`, most significant first
    #[arg(long, value_delimiter = ',')]
    pub order_by: Vec<String>,
    /// Records per page requested from the server
    #[arg(long)]
    pub page_size: Option<u32>,
    /// Stop after this many records
    #[arg(long)]
    pub limit: Option<usize>,
    /// Skip this many records
    #[arg(long)]
    pub offset: Option<usize>,
    /// Print the first page URL instead of running the query
    #[arg(long)]
    pub print_url: bool,
}

impl QueryCommands {
    pub fn to_request(&self) -> Result<FindRequest<Untyped>> {
        let mut builder = QueryBuilder::<Untyped>::new();

        for name in &self.select {
            builder = builder.select(&Column::parse(PropertyKind::Optional, name.as_str())?);
        }
        for name in &self.expand {
            builder = builder.expand(&Link::parse(PropertyKind::Collection, name.as_str())?);
        }
        for (position, key) in self.order_by.iter().enumerate() {
            let (name, descending) = parse_sort_key(key)?;
            let column = Column::parse(PropertyKind::Optional, name)?;
            builder = match (position, descending) {
                (0, false) => builder.order_by(&column),
                (0, true) => builder.order_by_descending(&column),
                (_, false) => builder.then_by(&column),
                (_, true) => builder.then_by_descending(&column),
            };
        }
        if let Some(size) = self.page_size {
            builder = builder.max_page_size(size);
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }

        Ok(builder.build())
    }
}

fn parse_sort_key(key: &str) -> Result<(&str, bool)> {
    match key.split_once(':') {
        None => Ok((key, false)),
        Some((name, "asc")) => Ok((name, false)),
        Some((name, "desc")) => Ok((name, true)),
        Some((_, direction)) => anyhow::bail!("Unknown sort direction '{}' in '{}'", direction, key),
    }
}

pub async fn query_command(args: QueryCommands, client: &DynamicsClient, cancel: &CancellationToken) -> Result<()> {
    info!("Executing query against {}", args.entity_set);

    let request = args.to_request()?;
    if args.print_url {
        println!("{}", client.query_url(&args.entity_set, &request));
        return Ok(());
    }

    let mut records = client.find_in(&args.entity_set, &request, cancel.clone());
    let mut stdout = std::io::stdout().lock();
    let mut count = 0usize;
    while let Some(record) = records.try_next().await.context("Query failed")? {
        serde_json::to_writer(&mut stdout, record.fields())?;
        writeln!(stdout)?;
        count += 1;
    }

    info!("Printed {} records", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamics_webapi::api::{Encoding, QueryCompiler};

    fn args() -> QueryCommands {
        QueryCommands {
            entity_set: "accounts".into(),
            select: vec!["name".into(), "revenue".into()],
            expand: vec!["contact_customer_accounts".into()],
            order_by: vec!["revenue:desc".into(), "name".into()],
            page_size: Some(50),
            limit: Some(10),
            offset: None,
            print_url: true,
        }
    }

    #[test]
    fn builds_request_from_arguments() {
        let request = args().to_request().unwrap();
        assert_eq!(request.max_page_size(), Some(50));
        assert_eq!(request.limit(), Some(10));
        assert_eq!(
            QueryCompiler::new().query_string(&request, Encoding::Raw),
            "$select=name,revenue&$expand=contact_customer_accounts&$orderby=revenue desc,name asc"
        );
    }

    #[test]
    fn rejects_unknown_direction() {
        assert!(parse_sort_key("name:up").is_err());
        assert_eq!(parse_sort_key("name:asc").unwrap(), ("name", false));
    }

    #[test]
    fn rejects_empty_column() {
        let mut args = args();
        args.select = vec!["".into()];
        assert!(args.to_request().is_err());
    }
}
