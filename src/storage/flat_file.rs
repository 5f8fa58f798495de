use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{Capabilities, SynapseStore};
use crate::error::{Error, Result};
use crate::synapse::SynapseRecord;
use crate::types::HashMap;

const BASE_COLUMNS: usize = 11;
const WITH_RELEASE_COUNT_COLUMNS: usize = 12;

pub struct FlatFileStore {
    name: String,
    targets: HashMap<usize, Vec<SynapseRecord>>,
    capabilities: Capabilities,
}

impl FlatFileStore {
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let contents =
            fs::read_to_string(path).map_err(|err| Error::backend_unavailable(&name, err))?;
        Self::parse(name, &contents)
    }

    pub fn parse(name: String, contents: &str) -> Result<Self> {
        let (targets, num_columns) =
            parse_blocks(contents).map_err(|reason| Error::backend_unavailable(&name, reason))?;

        let capabilities = Capabilities::new(num_columns == Some(WITH_RELEASE_COUNT_COLUMNS));

        log::debug!(
            "opened flat synapse file {} with {} targets",
            name,
            targets.len()
        );

        Ok(Self {
            name,
            targets,
            capabilities,
        })
    }

    pub fn write(path: &Path, targets: &BTreeMap<usize, Vec<SynapseRecord>>) -> Result<()> {
        fs::write(path, format_blocks(targets))
            .map_err(|err| Error::InvalidInput(format!("cannot write {}: {}", path.display(), err)))
    }
}

type ParsedBlocks = (HashMap<usize, Vec<SynapseRecord>>, Option<usize>);

fn parse_blocks(contents: &str) -> std::result::Result<ParsedBlocks, String> {
    let mut targets = HashMap::default();
    let mut num_columns = None;

    let mut lines = contents
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

    while let Some((line_no, header)) = lines.next() {
        let fields: Vec<&str> = header.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(format!("line {}: expected block header 'post_nid count'", line_no));
        }

        let post_nid = parse_field::<usize>(fields[0], line_no)?;
        let count = parse_field::<usize>(fields[1], line_no)?;

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let (line_no, row) = lines
                .next()
                .ok_or_else(|| format!("target {}: truncated block", post_nid))?;
            let fields: Vec<&str> = row.split_whitespace().collect();

            match num_columns {
                None => num_columns = Some(fields.len()),
                Some(expected) if expected != fields.len() => {
                    return Err(format!(
                        "line {}: {} columns, previous rows have {}",
                        line_no,
                        fields.len(),
                        expected
                    ))
                }
                _ => {}
            }

            records.push(parse_row(&fields, line_no)?);
        }

        if targets.insert(post_nid, records).is_some() {
            return Err(format!("target {} appears twice", post_nid));
        }
    }

    Ok((targets, num_columns))
}

fn parse_row(fields: &[&str], line_no: usize) -> std::result::Result<SynapseRecord, String> {
    if fields.len() != BASE_COLUMNS && fields.len() != WITH_RELEASE_COUNT_COLUMNS {
        return Err(format!(
            "line {}: expected {} or {} columns, got {}",
            line_no,
            BASE_COLUMNS,
            WITH_RELEASE_COUNT_COLUMNS,
            fields.len()
        ));
    }

    let offset = parse_field(fields[4], line_no)?;

    Ok(SynapseRecord {
        pre_nid: parse_field(fields[0], line_no)?,
        delay: parse_field(fields[1], line_no)?,
        section_id: parse_field(fields[2], line_no)?,
        segment_id: parse_field(fields[3], line_no)?,
        offset,
        weight: parse_field(fields[5], line_no)?,
        u: parse_field(fields[6], line_no)?,
        d: parse_field(fields[7], line_no)?,
        f: parse_field(fields[8], line_no)?,
        dtc: parse_field(fields[9], line_no)?,
        syn_type: parse_field(fields[10], line_no)?,
        release_sites: fields
            .get(11)
            .map(|field| parse_field(field, line_no))
            .transpose()?,
        u_hill_coefficient: None,
        conductance_ratio: None,
        location: offset,
    })
}

fn parse_field<T: std::str::FromStr>(field: &str, line_no: usize) -> std::result::Result<T, String> {
    field
        .parse()
        .map_err(|_| format!("line {}: cannot parse '{}'", line_no, field))
}

fn format_blocks(targets: &BTreeMap<usize, Vec<SynapseRecord>>) -> String {
    let mut out = String::new();

    for (post_nid, records) in targets {
        out.push_str(&format!("{} {}\n", post_nid, records.len()));
        for record in records {
            out.push_str(&format!(
                "{} {} {} {} {} {} {} {} {} {} {}",
                record.pre_nid,
                record.delay,
                record.section_id,
                record.segment_id,
                record.offset,
                record.weight,
                record.u,
                record.d,
                record.f,
                record.dtc,
                record.syn_type
            ));
            if let Some(release_sites) = record.release_sites {
                out.push_str(&format!(" {}", release_sites));
            }
            out.push('\n');
        }
    }

    out
}

impl SynapseStore for FlatFileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn read(&mut self, post_nid: usize) -> Result<Vec<SynapseRecord>> {
        self.targets
            .get(&post_nid)
            .cloned()
            .ok_or(Error::RecordNotFound(post_nid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::assert_equal;

    const CONTENTS: &str = "# legacy edges
10 3
5 1.5 12 3 0.25 0.8 0.5 670 17 1.7 113 4
5 1.5 14 0 0.75 0.6 0.5 670 17 1.7 113 2
7 2.25 3 1 0.5 1.2 0.25 700 10 8.3 6 1

11 0
";

    #[test]
    fn parses_blocks() {
        let mut sut = FlatFileStore::parse("legacy".to_string(), CONTENTS).unwrap();
        assert!(sut.capabilities().has_release_count);

        let records = sut.read(10).unwrap();
        assert_equal(records.iter().map(|record| record.pre_nid), [5, 5, 7]);
        assert_eq!(records[0].section_id, 12);
        assert_eq!(records[1].release_sites, Some(2));
        assert_eq!(records[2].syn_type, 6);

        assert!(sut.read(11).unwrap().is_empty());
        assert!(matches!(sut.read(12), Err(Error::RecordNotFound(12))));
    }

    #[test]
    fn eleven_columns_lack_release_count() {
        let sut = FlatFileStore::parse("legacy".to_string(), "1 1\n2 0.1 0 0 0.5 1 0.5 1 1 1 120\n")
            .unwrap();
        assert!(!sut.capabilities().has_release_count);
    }

    #[test]
    fn truncated_block_is_unavailable() {
        let result = FlatFileStore::parse("legacy".to_string(), "10 2\n5 1.5 12 3 0.25 0.8 0.5 670 17 1.7 113\n");
        assert!(matches!(result, Err(Error::BackendUnavailable { .. })));
    }

    #[test]
    fn mixed_column_counts_are_unavailable() {
        let contents = "10 2\n5 1.5 12 3 0.25 0.8 0.5 670 17 1.7 113\n5 1.5 12 3 0.25 0.8 0.5 670 17 1.7 113 2\n";
        let result = FlatFileStore::parse("legacy".to_string(), contents);
        assert!(matches!(result, Err(Error::BackendUnavailable { .. })));
    }

    #[test]
    fn format_then_parse_preserves_rows() {
        let mut record = SynapseRecord::new(3, 0.675, 0.9, 101);
        record.release_sites = Some(5);
        let targets = BTreeMap::from([(20, vec![record])]);

        let mut sut = FlatFileStore::parse("fmt".to_string(), &format_blocks(&targets)).unwrap();
        assert_eq!(sut.read(20).unwrap(), vec![record]);
    }
}
