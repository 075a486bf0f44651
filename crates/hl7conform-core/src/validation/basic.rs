/// Header checks: version, message type, trigger event and structure id.
///
/// Every mismatch is fatal for the later phases. Version 2.3.1 acknowledgements
/// are allowed to leave out the trigger event and the structure id.
use crate::failure::{FailureKind, FailureLocation, MessageFailure};
use crate::location::MessageLocation;
use crate::message::MessageHeader;
use crate::profile::Profile;

/// Version whose ACK messages may omit MSH-9.2 and MSH-9.3.
const LEGACY_ACK_VERSION: &str = "2.3.1";

/// Compares the message header with the profile header.
///
/// `locate` turns a header location (`MSH[1].12[1]`, `MSH[1].9[1].2`, ...)
/// into a failure location. Returns the findings, or a single
/// [`FailureKind::Checked`] marker when the header matches.
pub(crate) fn check_header(
    profile: &Profile,
    header: &dyn MessageHeader,
    locate: &dyn Fn(&MessageLocation) -> FailureLocation,
) -> Vec<MessageFailure> {
    let expected = profile.header();
    let mut out = Vec::new();
    let msh = MessageLocation::for_segment("MSH", 1);

    if !expected.hl7_version.is_empty() && header.version() != Some(expected.hl7_version.as_str()) {
        let description = match header.version() {
            Some(found) => format!(
                "The message version '{found}' does not match the profile version '{}'",
                expected.hl7_version
            ),
            None => format!(
                "The message does not declare a version (MSH-12); the profile requires '{}'",
                expected.hl7_version
            ),
        };
        let at = msh.clone().with_field(12, 1).with_component(1);
        out.push(
            MessageFailure::new(FailureKind::Version, description)
                .fatal()
                .located(locate(&at))
                .with_content(header.version().unwrap_or_default()),
        );
    }

    let legacy_ack =
        header.version() == Some(LEGACY_ACK_VERSION) && header.message_type() == Some("ACK");
    let checks = [
        (1, "message type", header.message_type(), expected.message_type.as_str(), false),
        (2, "trigger event", header.trigger_event(), expected.event_type.as_str(), legacy_ack),
        (3, "message structure id", header.structure_id(), expected.structure_id.as_str(), legacy_ack),
    ];
    for (component, what, found, wanted, may_be_absent) in checks {
        if wanted.is_empty() || found == Some(wanted) || (may_be_absent && found.is_none()) {
            continue;
        }
        let description = match found {
            Some(found) => {
                format!("The {what} '{found}' does not match the profile {what} '{wanted}'")
            }
            None => format!("The {what} (MSH-9.{component}) is missing; the profile requires '{wanted}'"),
        };
        let at = msh.clone().with_field(9, 1).with_component(component);
        out.push(
            MessageFailure::new(FailureKind::MessageStructureId, description)
                .fatal()
                .located(locate(&at))
                .with_content(found.unwrap_or_default()),
        );
    }

    if out.is_empty() {
        out.push(
            MessageFailure::checked("The message version, type, trigger event and structure id match the profile")
                .located(locate(&msh)),
        );
    }
    out
}
