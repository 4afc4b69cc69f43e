use crate::i18n::Translator;
use askama::Template;

#[derive(Template)]
#[template(path = "signin.html")]
pub struct SignInTemplate {
    pub lang: String,
    pub welcome_back: String,
    pub sign_in_to_continue: String,
    pub sign_in: String,
    pub connecting: String,
    pub azure_ad_description: String,
    pub signin_url: String,
}

impl SignInTemplate {
    pub fn localized(translator: &Translator, signin_url: String) -> Self {
        Self {
            lang: translator.locale().to_string(),
            welcome_back: translator.t("auth.welcomeBack"),
            sign_in_to_continue: translator.t("auth.signInToContinue"),
            sign_in: translator.t("auth.signIn"),
            connecting: translator.t("auth.connecting"),
            azure_ad_description: translator.t("auth.azureAdDescription"),
            signin_url,
        }
    }
}
