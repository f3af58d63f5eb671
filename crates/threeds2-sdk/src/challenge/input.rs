use threeds2_messages::{ChallengeRequestParameters, ProtocolVersion};

/// What the cardholder did on a challenge screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeInput {
    /// Free text, e.g. a one-time code.
    Text(String),
    /// Key of the chosen `challengeSelectInfo` entry.
    SingleSelect(String),
    /// Keys of all chosen entries.
    MultiSelect(Vec<String>),
    /// Form data submitted from an ACS HTML page.
    HtmlForm(String),
    /// Out-of-band authentication finished; ask the ACS for the result.
    Continue,
    /// Ask the ACS to send a new code.
    Resend,
    Cancel,
}

impl ChallengeInput {
    /// Write this input into the next request.
    ///
    /// Empty entries are sent as `challengeNoEntry` where the protocol
    /// version has it, and omitted otherwise. `Cancel` writes nothing.
    pub(crate) fn apply(&self, request: &mut ChallengeRequestParameters, version: ProtocolVersion) {
        let entry = match self {
            Self::Text(text) | Self::SingleSelect(text) => Some(text.clone()),
            Self::MultiSelect(keys) => Some(keys.join(",")),
            Self::HtmlForm(form) => {
                if form.is_empty() {
                    no_entry(request, version);
                } else {
                    request.challenge_html_data_entry = Some(form.clone());
                }
                None
            }
            Self::Continue => {
                request.set_oob_continue();
                None
            }
            Self::Resend => {
                request.set_resend_challenge();
                None
            }
            Self::Cancel => None,
        };
        match entry {
            Some(entry) if !entry.is_empty() => request.challenge_data_entry = Some(entry),
            Some(_) => no_entry(request, version),
            None => {}
        }
    }
}

fn no_entry(request: &mut ChallengeRequestParameters, version: ProtocolVersion) {
    if version.supports_no_entry_indicator() {
        request.set_no_entry();
    }
}
