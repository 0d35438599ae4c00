use chrono::NaiveDate;

use super::channel::OutboundMessage;
use crate::workflows::prospects::{Offer, Prospect};
use crate::workflows::sessions::domain::Formation;
use crate::workflows::sessions::{JuryInvitation, Session};

const DISPLAY_DATE: &str = "%d/%m/%Y";

/// Confirmation links for one invitation, in `(present, absent)` order.
pub fn confirmation_links(
    base_url: &str,
    session: &Session,
    jury: &JuryInvitation,
    token: &str,
) -> (String, String) {
    let base = base_url.trim_end_matches('/');
    let session_id = urlencoding::encode(&session.id.0);
    let jury_id = urlencoding::encode(&jury.id.0);
    let token = urlencoding::encode(token);
    let link = |choice: &str| {
        format!("{base}/invitation/{session_id}/{jury_id}/{choice}?token={token}")
    };
    (link("present"), link("absent"))
}

fn exam_label(session: &Session) -> String {
    session
        .exam_date
        .as_deref()
        .and_then(crate::dates::parse_date)
        .map(|date| date.format(DISPLAY_DATE).to_string())
        .unwrap_or_else(|| "a date to be confirmed".to_string())
}

fn formation_label(code: &str) -> String {
    Formation::from_code(code)
        .map(|formation| formation.label().to_string())
        .unwrap_or_else(|| code.to_string())
}

pub fn jury_invitation(
    base_url: &str,
    session: &Session,
    jury: &JuryInvitation,
    token: &str,
) -> OutboundMessage {
    let (present, absent) = confirmation_links(base_url, session, jury, token);
    let exam = exam_label(session);
    let formation = formation_label(&session.formation);
    OutboundMessage {
        subject: format!("Jury invitation: {formation} exam on {exam}"),
        body: format!(
            "Hello {name},\n\n\
             You are invited to sit on the exam jury for the {formation} session \"{session}\" on {exam}.\n\n\
             I will attend: {present}\n\
             I cannot attend: {absent}\n",
            name = jury.name,
            session = session.name,
        ),
        short: format!("Jury {formation} on {exam}. Attend: {present} / Decline: {absent}"),
    }
}

pub fn jury_reminder(
    base_url: &str,
    session: &Session,
    jury: &JuryInvitation,
    token: &str,
) -> OutboundMessage {
    let (present, absent) = confirmation_links(base_url, session, jury, token);
    let exam = exam_label(session);
    let formation = formation_label(&session.formation);
    OutboundMessage {
        subject: format!("Reminder: please confirm your jury attendance on {exam}"),
        body: format!(
            "Hello {name},\n\n\
             We have not yet received your answer for the {formation} exam jury on {exam}.\n\n\
             I will attend: {present}\n\
             I cannot attend: {absent}\n",
            name = jury.name,
        ),
        short: format!("Reminder jury {formation} on {exam}. Attend: {present} / Decline: {absent}"),
    }
}

pub fn follow_up_offer(
    prospect: &Prospect,
    formation: Formation,
    start: NaiveDate,
    offer: &Offer,
) -> OutboundMessage {
    let start = start.format(DISPLAY_DATE).to_string();
    let discount = if offer.discount_percent > 0 {
        format!(" ({}% off the list price of {} EUR)", offer.discount_percent, formation.base_price())
    } else {
        String::new()
    };
    OutboundMessage {
        subject: format!("{}: a place is still available from {start}", formation.label()),
        body: format!(
            "Hello {name},\n\n\
             The {label} training starting on {start} still has seats. \
             We can offer it to you for {price} EUR{discount}.\n\n\
             Reply to this message to book your place.\n",
            name = prospect.name,
            label = formation.label(),
            price = offer.price,
        ),
        short: format!(
            "{} from {start}: {} EUR{discount}. Reply to book.",
            formation.code().to_ascii_uppercase(),
            offer.price
        ),
    }
}
