// Primitives for writing CSV exports.

use std::io::Write;

use csv::Writer;

use crate::audit::*;

/// One stored discrepancy, for a contest or one of its assertions.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DiscrepancyRow {
    pub county_id: u64,
    pub contest: String,
    /// Empty for plurality contests.
    pub assertion: String,
    pub cvr_id: CvrId,
    pub code: i32,
}

/// The discrepancies currently stored by the audits. The county of a row is the
/// county of its CVR.
pub fn discrepancy_rows<R: AuditRepository>(coordinator: &AuditRoundCoordinator<R>) -> Vec<DiscrepancyRow> {
    let county_of = |cvr_id: CvrId| match coordinator.repository().cvr(cvr_id) {
        Some(cvr) => Some(cvr.county_id),
        None => {
            warn!("discrepancy_rows: unknown CVR {}", cvr_id);
            None
        }
    };
    let mut res = Vec::new();
    for audit in coordinator.audits() {
        for (cvr_id, code) in audit.discrepancies() {
            if let Some(county_id) = county_of(*cvr_id) {
                res.push(DiscrepancyRow {
                    county_id,
                    contest: audit.contest_name().to_string(),
                    assertion: "".to_string(),
                    cvr_id: *cvr_id,
                    code: *code,
                });
            }
        }
        for a in audit.assertions() {
            for (cvr_id, code) in a.discrepancies() {
                if let Some(county_id) = county_of(*cvr_id) {
                    res.push(DiscrepancyRow {
                        county_id,
                        contest: audit.contest_name().to_string(),
                        assertion: format!("{} {} v {}", a.kind, a.winner, a.loser),
                        cvr_id: *cvr_id,
                        code: *code,
                    });
                }
            }
        }
    }
    res
}

pub fn write_interpretations<W: Write>(
    wtr: &mut Writer<W>,
    interpretations: &[BallotInterpretation],
) -> Result<(), csv::Error> {
    wtr.write_record([
        "County",
        "Contest",
        "CVR ID",
        "Imprinted ID",
        "Record type",
        "Raw choices",
        "Interpreted as",
    ])?;
    for i in interpretations {
        wtr.write_record(&[
            i.county_id.to_string(),
            i.contest.clone(),
            i.cvr_id.to_string(),
            i.imprinted_id.clone(),
            i.record_type.to_string(),
            format!("[{}]", i.raw_choices.join(",")),
            format!("[{}]", i.interpreted_choices.join(",")),
        ])?;
    }
    Ok(())
}

pub fn write_discrepancies<W: Write>(
    wtr: &mut Writer<W>,
    rows: &[DiscrepancyRow],
) -> Result<(), csv::Error> {
    wtr.write_record(["County", "Contest", "Assertion", "CVR ID", "Discrepancy"])?;
    for r in rows {
        wtr.write_record(&[
            r.county_id.to_string(),
            r.contest.clone(),
            r.assertion.clone(),
            r.cvr_id.to_string(),
            r.code.to_string(),
        ])?;
    }
    Ok(())
}

pub fn write_interpretations_file(
    path: &str,
    interpretations: &[BallotInterpretation],
) -> RlaResult<()> {
    info!(
        "write_interpretations_file: {} interpretations to {}",
        interpretations.len(),
        path
    );
    let mut wtr = Writer::from_path(path).context(CsvWriteSnafu { path })?;
    write_interpretations(&mut wtr, interpretations).context(CsvWriteSnafu { path })?;
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

pub fn write_discrepancies_file(path: &str, rows: &[DiscrepancyRow]) -> RlaResult<()> {
    info!("write_discrepancies_file: {} rows to {}", rows.len(), path);
    let mut wtr = Writer::from_path(path).context(CsvWriteSnafu { path })?;
    write_discrepancies(&mut wtr, rows).context(CsvWriteSnafu { path })?;
    wtr.flush().context(WritingOutputSnafu { path })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpretation_rows() {
        let interpretation = BallotInterpretation {
            county_id: 3,
            contest: "Mayor".to_string(),
            record_type: RecordType::Uploaded,
            cvr_id: CvrId(12),
            imprinted_id: "3-1-12".to_string(),
            raw_choices: vec!["Alice(1)".to_string(), "Bob(1)".to_string()],
            interpreted_choices: Vec::new(),
        };
        let mut wtr = Writer::from_writer(Vec::new());
        write_interpretations(&mut wtr, &[interpretation]).unwrap();
        let data = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        assert_eq!(
            data,
            "County,Contest,CVR ID,Imprinted ID,Record type,Raw choices,Interpreted as\n\
             3,Mayor,12,3-1-12,UPLOADED,\"[Alice(1),Bob(1)]\",[]\n"
        );
    }

    #[test]
    fn discrepancy_rows_csv() {
        let rows = vec![DiscrepancyRow {
            county_id: 1,
            contest: "Mayor".to_string(),
            assertion: "NEB Alice v Bob".to_string(),
            cvr_id: CvrId(4),
            code: -1,
        }];
        let mut wtr = Writer::from_writer(Vec::new());
        write_discrepancies(&mut wtr, &rows).unwrap();
        let data = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        assert_eq!(
            data,
            "County,Contest,Assertion,CVR ID,Discrepancy\n1,Mayor,NEB Alice v Bob,4,-1\n"
        );
    }
}
