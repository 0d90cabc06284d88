use massbus::MassbusError;

pub struct CliError(pub String);

impl From<MassbusError> for CliError {
    fn from(e: MassbusError) -> Self {
        CliError(e.to_string())
    }
}
