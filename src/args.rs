use clap::Parser;

/// This is a risk-limiting audit program for plurality and ranked (IRV) contests.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file describing the audit in JSON format: settings, contest results,
    /// CVRs, rounds and the submissions of the audit boards.
    #[clap(short, long, value_parser)]
    pub scenario: String,
    /// (file path) A reference file containing an audit report in JSON format. If provided, rla will
    /// check that the computed report matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the audit report will be written in JSON format to the given
    /// location. It is printed to the standard output otherwise.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the corrections made to the ranked ballots are written to
    /// this CSV file.
    #[clap(long, value_parser)]
    pub interpretations: Option<String>,

    /// (file path or empty) If specified, the discrepancies stored for each contest and assertion
    /// are written to this CSV file.
    #[clap(long, value_parser)]
    pub discrepancies: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
