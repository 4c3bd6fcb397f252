//! Tag command handlers.

use tabled::Tabled;

use rfidly_core::{Station, TagResponse};

use crate::cli::{GlobalOpts, TagsArgs, TagsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct TagRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "EPC")]
    tag: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Qty")]
    quantity: String,
    #[tabled(rename = "Scans")]
    scans: String,
    #[tabled(rename = "Last seen")]
    timestamp: String,
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

impl From<&TagResponse> for TagRow {
    fn from(t: &TagResponse) -> Self {
        Self {
            id: t.id.clone(),
            tag: t.tag.clone(),
            name: t.tag_name.clone().unwrap_or_default(),
            quantity: opt(t.quantity),
            scans: opt(t.scan_count),
            timestamp: t.timestamp.clone().unwrap_or_default(),
        }
    }
}

fn detail(t: &TagResponse) -> String {
    [
        format!("ID:        {}", t.id),
        format!("EPC:       {}", t.tag),
        format!("Name:      {}", t.tag_name.as_deref().unwrap_or("-")),
        format!("Quantity:  {}", opt(t.quantity)),
        format!("Expires:   {}", t.expired_date.as_deref().unwrap_or("-")),
        format!("Scans:     {}", opt(t.scan_count)),
        format!("Dev/Ant:   {}/{}", opt(t.device_no), opt(t.antenna_no)),
        format!("Last seen: {}", t.timestamp.as_deref().unwrap_or("-")),
        format!("Processed: {}", t.processed),
    ]
    .join("\n")
}

pub async fn handle(station: &Station, args: TagsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        TagsCommand::List { list, query } => {
            let tags = util::collect_pages(&list, |page, per_page| {
                station.list_tags(page, per_page, query.as_deref())
            })
            .await?;
            let out = output::render_list(
                &global.output,
                &tags,
                |t| TagRow::from(t),
                |t| t.tag.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TagsCommand::Get { epc } => {
            let tag = station.find_tag(&epc).await?;
            let out = output::render_single(&global.output, &tag, detail, |t| t.id.clone());
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
