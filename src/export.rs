//! Bulk member export in the format read by the CIDB Data Load Tool.

use crate::error::Result;
use crate::member::Member;
use crate::metrics::ApiMetrics;
use crate::wrapper::{ConsumerContext, ConsumerWrapper};
use crate::xml::DocumentWriter;
use std::io::Write;
use tracing::info;

/// Writes `<Consumers>` with one numbered `<Consumer>` record per member.
///
/// Each record is written as soon as its member is pulled from `members`.
pub fn dataloadtool_export<'a, W: Write>(
    out: W,
    members: impl IntoIterator<Item = &'a Member>,
    context: &ConsumerContext,
    pretty: bool,
) -> Result<usize> {
    let mut document = DocumentWriter::start(out, "Consumers", pretty)?;
    let mut count: usize = 0;
    for member in members {
        let wrapper = ConsumerWrapper::from_member(member, context.clone())?;
        let record = wrapper
            .into_consumer()
            .to_node()
            .with_attribute("recordNumber", count.to_string());
        document.write(&record)?;
        count += 1;
    }
    document.finish()?;
    info!("Exported {} members", count);
    ApiMetrics::record_exported(count as u64);
    Ok(count)
}

/// Members still to be loaded: those without a consumer, or all of them.
pub fn select_members(members: &[Member], include_all: bool) -> Vec<&Member> {
    members
        .iter()
        .filter(|m| include_all || m.consumer_id.is_none())
        .collect()
}
